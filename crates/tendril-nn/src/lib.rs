//! # tendril-nn
//!
//! Layers whose weights, losses, and updates are tracked by `tendril-core`.
//!
//! - [`Dense`] — fully-connected layer (kernel + bias)
//! - [`BatchNormalization`] — gamma/beta plus non-trainable moving statistics
//! - [`Sequential`] — a chain of layers held in a tracked list
//! - [`Model`] — a layer assembled from attribute-assigned sublayers
//! - [`init`] / [`regularizer`] — weight initializers and penalties

pub mod batchnorm;
pub mod dense;
pub mod init;
pub mod model;
pub mod regularizer;
pub mod sequential;

pub use batchnorm::{record_batch_statistics, BatchNormalization};
pub use dense::Dense;
pub use init::Initializer;
pub use model::Model;
pub use sequential::Sequential;
