mod cameras;
pub use cameras::*;

mod proximity;
pub use proximity::*;
