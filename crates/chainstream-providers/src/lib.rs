//! chainstream-providers — pre-configured provider profiles.
//!
//! Each profile knows its service's URL templates, request encoding,
//! response shape and rate limits.
//!
//! # Quick start
//! ```rust,no_run
//! use chainstream_core::{StreamRequest, Streamer};
//! use chainstream_providers::etherscan::{self, EtherscanConfig, ProviderKind};
//!
//! # async fn run() -> Result<(), chainstream_core::StreamError> {
//! let config = EtherscanConfig::default();
//! let client = etherscan::shared_client()?;
//! let streamer = Streamer::new(etherscan::build(ProviderKind::All, &config, client)?);
//! let txs = streamer
//!     .stream(StreamRequest::new("0x4a1eade6b3780b50582344c162a547d04e4e8e4a"))
//!     .await?;
//! # drop(txs);
//! # Ok(())
//! # }
//! ```

pub mod etherscan;
