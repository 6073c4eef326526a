mod auth_tests;
mod poller_tests;
