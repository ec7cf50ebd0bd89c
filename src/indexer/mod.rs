pub mod deposit_formatter;
pub mod explorer_client;

pub use deposit_formatter::DepositFormatter;
pub use explorer_client::{ExplorerClient, TransferSource};
