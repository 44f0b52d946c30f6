//! Session error channel.
//!
//! Only environment-driven failures travel through `Result`: unusable
//! targets, output-file trouble and container assembly errors. Emission
//! calls that violate the session contract panic at the call site instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Target(#[from] gabbro_stream::TargetError),
    #[error("failed to create output file `{path}`: {source}")]
    Create { path: PathBuf, source: io::Error },
    #[error("failed to write output file `{path}`: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Emit(#[from] gabbro_stream::EmitError),
}
