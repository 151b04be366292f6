pub mod init;
pub mod tenant;
