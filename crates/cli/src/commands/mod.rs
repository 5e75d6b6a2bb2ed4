pub mod chat;
pub mod init;
pub mod serve;
pub mod threads;
