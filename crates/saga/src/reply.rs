use domain::{Handler, PurchaseReply, RollbackReply};
use event_bus::{BusError, HANDLER_KEY, Message};

use crate::Result;

/// A reply decoded according to its handler tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Reply to a forward step command.
    Forward {
        handler: Handler,
        reply: PurchaseReply,
    },
    /// Reply to a compensation command.
    Compensation {
        handler: Handler,
        reply: RollbackReply,
    },
}

impl Reply {
    /// Decodes a reply message.
    ///
    /// A missing or unknown tag and an undecodable payload are permanent
    /// errors.
    pub fn decode(message: &Message) -> Result<Self> {
        let tag = message
            .handler()
            .ok_or(BusError::MissingMetadata(HANDLER_KEY))?;
        let handler: Handler = tag.parse()?;

        if handler.is_compensation() {
            Ok(Reply::Compensation {
                handler,
                reply: message.decode()?,
            })
        } else {
            Ok(Reply::Forward {
                handler,
                reply: message.decode()?,
            })
        }
    }

    /// Returns the handler tag.
    pub fn handler(&self) -> Handler {
        match self {
            Reply::Forward { handler, .. } | Reply::Compensation { handler, .. } => *handler,
        }
    }

    /// Returns the reported success flag.
    pub fn success(&self) -> bool {
        match self {
            Reply::Forward { reply, .. } => reply.success,
            Reply::Compensation { reply, .. } => reply.success,
        }
    }
}
