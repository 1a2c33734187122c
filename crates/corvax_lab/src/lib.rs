//! Umbrella crate for Corvax Lab.
//!
//! Re-exports the engine and protocol crates so downstream code can depend on a
//! single crate name (`corvax_lab`).

pub use corvax_lab_engine as engine;
pub use corvax_lab_protocol as protocol;

#[cfg(test)]
mod tests {
    use super::engine::{Engine, EngineConfig, MachineType};
    use super::protocol::Notification;

    #[test]
    fn reexports_reach_both_crates() {
        let mut engine = Engine::new(EngineConfig::default());
        assert!(engine.build_machine(MachineType::CatsLair, 0.0, 0.0).is_ok());
        assert_eq!(Notification::entered_room(1).text, "Entered Room 1");
    }
}
