pub mod sysuart;

pub use sysuart::{SysUart, UartStats};
