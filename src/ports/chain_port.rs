//! Result chain persistence port trait.

use crate::domain::chain::Block;
use crate::domain::error::ChaintraderError;

/// Backing store for a result chain. Loads and saves the whole chain at
/// once; an empty load means no chain exists yet.
pub trait ChainStorePort {
    fn load(&self) -> Result<Vec<Block>, ChaintraderError>;
    fn save(&self, blocks: &[Block]) -> Result<(), ChaintraderError>;
}
