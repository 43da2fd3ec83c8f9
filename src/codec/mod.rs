/*!
 * Launcher-File Codec
 * Self-describing text artifacts for installed resources
 */

pub mod decode;
pub mod encode;
pub mod types;

// Re-exports
pub use decode::{decode, decode_header};
pub use encode::encode;
pub use types::{
    ArtifactHeader, DecodeError, DecodeResult, DecodedArtifact, PayloadLocation, LOGIC_MARKER,
    NOOP_LOGIC,
};
