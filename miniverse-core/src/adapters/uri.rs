//! Path-style reference tokens
//!
//! `{prefix}/user/{id}`, `{prefix}/movement/{id}` and `{prefix}/transfer/{id}`.
//! Parsing accepts a full token, a token without the prefix or a bare id, so
//! transports can pass through whatever their clients sent.

use crate::domain::result::{Error, Result};
use crate::domain::{MovementId, TransferId, UserId};
use crate::ports::ReferenceResolver;

const USER_SEGMENT: &str = "user";
const MOVEMENT_SEGMENT: &str = "movement";
const TRANSFER_SEGMENT: &str = "transfer";

/// Default [`ReferenceResolver`]
#[derive(Debug, Clone, Default)]
pub struct UriReferences {
    prefix: String,
}

impl UriReferences {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn token(&self, segment: &str, id: impl std::fmt::Display) -> String {
        format!("{}/{}/{}", self.prefix, segment, id)
    }

    pub fn parse_user(&self, token: &str) -> Result<UserId> {
        UserId::new(last_segment(token, USER_SEGMENT)?)
    }

    pub fn parse_movement(&self, token: &str) -> Result<MovementId> {
        parse_numeric(token, MOVEMENT_SEGMENT).map(MovementId)
    }

    pub fn parse_transfer(&self, token: &str) -> Result<TransferId> {
        parse_numeric(token, TRANSFER_SEGMENT).map(TransferId)
    }
}

impl ReferenceResolver for UriReferences {
    fn user(&self, id: &UserId) -> String {
        self.token(USER_SEGMENT, id)
    }

    fn movement(&self, id: MovementId) -> String {
        self.token(MOVEMENT_SEGMENT, id)
    }

    fn transfer(&self, id: TransferId) -> String {
        self.token(TRANSFER_SEGMENT, id)
    }
}

/// Take the id after `/{segment}/`, or the whole token if it has no slash.
fn last_segment<'t>(token: &'t str, segment: &str) -> Result<&'t str> {
    let token = token.trim().trim_end_matches('/');
    let Some((head, id)) = token.rsplit_once('/') else {
        return Ok(token);
    };
    let kind = head.rsplit('/').next().unwrap_or_default();
    if kind != segment {
        return Err(Error::invalid_type(format!(
            "'{}' is not a {} reference",
            token, segment
        )));
    }
    Ok(id)
}

fn parse_numeric(token: &str, segment: &str) -> Result<i64> {
    let raw = last_segment(token, segment)?;
    raw.parse::<i64>()
        .map_err(|_| Error::not_found(format!("{} '{}'", segment, raw)))
}
