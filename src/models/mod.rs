mod commission;
mod ledger;
mod purchase;
mod shop;
mod subscription;
mod user;

pub use commission::*;
pub use ledger::*;
pub use purchase::*;
pub use shop::*;
pub use subscription::*;
pub use user::*;
