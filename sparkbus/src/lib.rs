pub use sparkbus_entity as entity;
pub use sparkbus_types as types;
pub mod transport {
  pub use sparkbus_transport::*;
}
pub mod codec {
  pub use sparkbus_codec_json as json;
}
