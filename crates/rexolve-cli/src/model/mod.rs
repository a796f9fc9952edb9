pub(crate) mod store;
pub(crate) mod trained_model;
