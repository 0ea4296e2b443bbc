pub mod activity;
pub mod identity;
