//! Outward-facing collaborators: detached signatures and publishing.

pub mod publish;
pub mod sign;

pub use publish::{CommandPublisher, Publisher};
pub use sign::{GpgSigner, Signer};
