mod cache;
mod case;
mod load;
mod opf;
mod parser;
mod report;
mod run;
mod scenario;
mod sweep;

pub mod debug;
pub mod idx;

pub use cache::*;
pub use case::*;
pub use load::*;
pub use opf::*;
pub use parser::*;
pub use report::*;
pub use run::*;
pub use scenario::*;
pub use sweep::*;
