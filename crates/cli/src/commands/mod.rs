pub mod decompile;
pub mod extract;
pub mod settings;

pub use decompile::*;
pub use extract::*;
pub use settings::*;
