pub mod conversation;
pub mod run;
pub mod turn;
