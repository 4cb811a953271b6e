mod channel_tests;
mod common;
mod nearby_tests;
mod sms_tests;
