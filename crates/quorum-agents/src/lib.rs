mod executor;
mod responder;
mod router;

pub use executor::FanoutExecutor;
pub use responder::{
    Responder, ResponderKind, ResponderRegistry, ResponderResult, RETRIEVAL_OVERFETCH,
    RETRIEVAL_RESULTS,
};
pub use router::{Router, RoutingDecision};
