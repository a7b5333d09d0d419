mod log_writer_tests;
mod record_log_tests;
mod shuffle_scenario_tests;
