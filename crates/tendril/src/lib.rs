//! # Tendril
//!
//! Dependency-tracked model graphs with validated checkpointing.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tendril::prelude::*;
//!
//! let mut graph = Graph::new();
//! let model = Model::new().input_dim(2).create(&mut graph);
//! let dense = Dense::new(3).create(&mut graph);
//! graph.set_attr(model, "layer_list", Value::list([Value::Object(dense)]))?;
//! graph.build(model, None)?;
//! checkpoint::save("model.tndr", &mut graph, model)?;
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `tendril-core` | Graph arena, values, wrappers, attribute tracking, traversal, consistency guard |
//! | `tendril-nn` | Layers (Dense, BatchNormalization, Sequential, Model), initializers, regularizers |
//!
//! ## Modules
//!
//! - [`checkpoint`] — Save/restore the variables of a graph (`.tndr` and in-memory backends)
//! - [`safetensors`] — HuggingFace-compatible checkpoint backend

/// Re-export core types.
pub use tendril_core::{
    bail, BuildContext, DType, DictMut, DictWrapper, Error, Fingerprint, Graph, Key, Layer,
    LayerState, ListMut, ListWrapper, LossTerm, Object, ObjectId, ObjectKind, Regularizer, Result,
    SharedDict, SharedList, TupleWrapper, Update, Value, Variable, VariableBackend,
    VariableFilter, VariableId, Visit,
};

/// Re-export layers.
pub mod nn {
    pub use tendril_nn::*;
}

/// Checkpoint — save and restore graph variables.
pub mod checkpoint;

/// Safetensors — interoperable checkpoint backend.
pub mod safetensors;

/// Convenient imports for typical use.
pub mod prelude {
    pub use crate::checkpoint::{
        self, BinaryIo, CheckpointConfig, CheckpointIo, Checkpointer, MemoryIo, Record,
        RestoreStatus,
    };
    pub use crate::safetensors::SafetensorsIo;
    pub use tendril_core::{
        DType, Error, Graph, Key, Layer, ObjectId, Result, SharedDict, SharedList, Value,
        VariableBackend, VariableFilter, VariableId,
    };
    pub use tendril_nn::{
        record_batch_statistics, BatchNormalization, Dense, Initializer, Model, Sequential,
    };
}
