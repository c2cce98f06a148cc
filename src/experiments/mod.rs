pub mod env_flat_walk;
