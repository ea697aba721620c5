pub mod port;
pub mod selection;

pub use port::{SerialConnector, SerialSource};
pub use selection::{choose_port, list_ports, prompt_for_port, PortEntry};
