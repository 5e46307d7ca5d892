//! Reference resolver port
//!
//! Non-expanded views point at related entities through opaque tokens. The
//! token format belongs to whatever transport sits on top of the core.

use crate::domain::{MovementId, TransferId, UserId};

pub trait ReferenceResolver: Send + Sync {
    fn user(&self, id: &UserId) -> String;

    fn movement(&self, id: MovementId) -> String;

    fn transfer(&self, id: TransferId) -> String;
}
