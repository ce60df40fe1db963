//! Mining of decoding run logs for the best-scoring trial.
//!
//! The decoders are invoked repeatedly with different LM weights; each
//! trial reports a line of the form
//!
//! ```text
//! ... WER: 12.34% (/exp/st/decode_phone/tri3b/decode_7.0.0)
//! ```
//!
//! The score follows the `WER:` label, the artifact path sits between the
//! parentheses. WER is an error rate, so lower wins.

pub mod wer;

pub use wer::{path_field, select_best, BestResult};
