mod catalog_tests;
mod optimizer_tests;
mod pusher_tests;
