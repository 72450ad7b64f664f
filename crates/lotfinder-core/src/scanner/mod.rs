pub mod classify;
pub mod walk;

pub use classify::{classify, extract_lot_number};
pub use walk::{ScanFilter, ScanMode, Scanner};
