pub mod app;
pub mod mac;
pub mod net;
pub mod queue;
pub mod sim;
pub mod topo;
pub mod viz;

#[cfg(test)]
mod test;
