pub mod confirmation;
pub mod dispatcher;
pub mod issuer;
pub mod poller;
pub mod sweeper;
