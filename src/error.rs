//! Errors surfaced by the link's public API

use paracook_shared::codec::CodecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Link is not connected")]
    NotConnected,

    #[error("Failed to encode envelope: {0}")]
    Codec(#[from] CodecError),
}
