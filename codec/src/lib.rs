mod tx;
mod utils;
mod utxo;
mod witness;

pub use tx::*;
pub use witness::*;
