pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryExecutionStore;
pub use traits::ExecutionStore;
