pub use self::{action::*, collision_box::*, obstacle::*, runner::*};

pub(crate) mod action;
pub(crate) mod collision_box;
pub(crate) mod obstacle;
pub(crate) mod runner;
