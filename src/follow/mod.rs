mod controller;
mod policy;

pub use controller::FollowController;
