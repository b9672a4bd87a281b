pub mod secret_protector;
