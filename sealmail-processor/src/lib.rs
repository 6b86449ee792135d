//! Message crypto orchestration for sealmail.
//!
//! Ties the block scanner and MIME walker to the crypto backends:
//! - [`MessageProcessor`]: decrypt, verify, encrypt, sign and render blocks
//! - [`VerifyFlow`] / [`DecryptFlow`]: per-block state machines with bounded
//!   key-fetch retry and passphrase prompting
//! - [`MessageSession`]: account-scoped driver over a [`KeyStore`] and a
//!   [`PubkeyLookup`]
//! - [`CancelHandle`]: cooperative cancellation of in-flight crypto

mod cancel;
mod collaborators;
mod config;
mod error;
mod flow;
mod key_registry;
mod processor;
mod session;

pub use cancel::{CancelHandle, CancelToken};
pub use collaborators::{KeyStore, PubkeyLookup};
pub use config::ProcessorConfig;
pub use error::{LookupError, ProcessorError, ProcessorResult};
pub use flow::{DecryptFlow, DecryptState, VerifyFlow, VerifyState};
pub use key_registry::MemoryKeyStore;
pub use processor::{
    DecryptResult, EncryptOptions, Framing, MessageProcessor, Passphrases, RenderContext,
    RenderOutcome, VerifyOutcome,
};
pub use session::MessageSession;
