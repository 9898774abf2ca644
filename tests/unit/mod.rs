//! Unit test modules.

mod config_test;
mod derivation_test;
mod heart_rate_parser_test;
mod settings_test;
