use thiserror::Error;

/// The three identifiers the gateway's hosted UI hands back on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCallback {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

/// Browser-side checkout orchestration, modeled as a typed state machine so
/// the SPA and this service agree on the contract.
///
/// `Idle -> OrderRequested -> GatewayOpen -> Verifying -> Succeeded | Failed`,
/// with dismissal of the hosted UI returning to `Idle`. On `Succeeded` the
/// side effects run in a fixed order: backup payment-record write, clear the
/// selection, navigate to confirmation with the order id. On `Failed` the
/// callback identifiers are retained (see [`CheckoutFlow::callback`]) so the
/// backup write is still attempted: the gateway may have captured funds even
/// when verification did not confirm it, and losing that evidence is worse
/// than a harmless duplicate write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckoutFlow {
    #[default]
    Idle,
    OrderRequested {
        amount: i64,
    },
    GatewayOpen {
        order_id: String,
        amount: i64,
    },
    Verifying {
        callback: GatewayCallback,
    },
    Succeeded {
        order_id: String,
    },
    Failed {
        reason: String,
        callback: Option<GatewayCallback>,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("cannot {action} from the {state} state")]
    IllegalTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("selection is empty")]
    EmptySelection,
    #[error("amount must be positive")]
    NonPositiveAmount,
}

impl CheckoutFlow {
    pub fn new() -> Self {
        CheckoutFlow::Idle
    }

    fn illegal(&self, action: &'static str) -> FlowError {
        FlowError::IllegalTransition {
            action,
            state: self.state_name(),
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            CheckoutFlow::Idle => "idle",
            CheckoutFlow::OrderRequested { .. } => "orderRequested",
            CheckoutFlow::GatewayOpen { .. } => "gatewayOpen",
            CheckoutFlow::Verifying { .. } => "verifying",
            CheckoutFlow::Succeeded { .. } => "succeeded",
            CheckoutFlow::Failed { .. } => "failed",
        }
    }

    /// User pressed "pay". Guarded: non-empty selection, positive amount.
    pub fn begin(self, item_count: usize, amount_minor: i64) -> Result<Self, FlowError> {
        match self {
            CheckoutFlow::Idle => {
                if item_count == 0 {
                    return Err(FlowError::EmptySelection);
                }
                if amount_minor <= 0 {
                    return Err(FlowError::NonPositiveAmount);
                }
                Ok(CheckoutFlow::OrderRequested {
                    amount: amount_minor,
                })
            }
            other => Err(other.illegal("begin checkout")),
        }
    }

    /// The order-creation call returned. The hosted UI is handed the order
    /// id and amount exactly as the gateway returned them; the client never
    /// recomputes the amount.
    pub fn order_created(self, order_id: String, amount_minor: i64) -> Result<Self, FlowError> {
        match self {
            CheckoutFlow::OrderRequested { .. } => Ok(CheckoutFlow::GatewayOpen {
                order_id,
                amount: amount_minor,
            }),
            other => Err(other.illegal("open gateway")),
        }
    }

    /// The gateway's completion callback fired with the three identifiers.
    pub fn gateway_completed(self, callback: GatewayCallback) -> Result<Self, FlowError> {
        match self {
            CheckoutFlow::GatewayOpen { .. } => Ok(CheckoutFlow::Verifying { callback }),
            other => Err(other.illegal("start verification")),
        }
    }

    /// User dismissed the hosted UI before paying. The already-minted order
    /// stays `created` server-side; nothing is completed.
    pub fn dismissed(self) -> Result<Self, FlowError> {
        match self {
            CheckoutFlow::GatewayOpen { .. } => Ok(CheckoutFlow::Idle),
            other => Err(other.illegal("dismiss gateway")),
        }
    }

    /// The verification endpoint answered.
    pub fn verification_result(self, verified: bool) -> Result<Self, FlowError> {
        match self {
            CheckoutFlow::Verifying { callback } => {
                if verified {
                    Ok(CheckoutFlow::Succeeded {
                        order_id: callback.razorpay_order_id,
                    })
                } else {
                    Ok(CheckoutFlow::Failed {
                        reason: "payment could not be verified".to_string(),
                        callback: Some(callback),
                    })
                }
            }
            other => Err(other.illegal("record verification result")),
        }
    }

    /// The verification call itself failed (transport error, server error).
    /// Recoverable for the user; the callback is retained for the backup
    /// write.
    pub fn verification_error(self, reason: impl Into<String>) -> Result<Self, FlowError> {
        match self {
            CheckoutFlow::Verifying { callback } => Ok(CheckoutFlow::Failed {
                reason: reason.into(),
                callback: Some(callback),
            }),
            other => Err(other.illegal("record verification error")),
        }
    }

    /// Identifiers for the best-effort payment-record write, available once
    /// the gateway callback has been received - including in `Failed`.
    pub fn callback(&self) -> Option<&GatewayCallback> {
        match self {
            CheckoutFlow::Verifying { callback } => Some(callback),
            CheckoutFlow::Failed {
                callback: Some(callback),
                ..
            } => Some(callback),
            _ => None,
        }
    }
}
