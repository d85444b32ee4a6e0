mod helpers;
mod mocks;

mod capture_jobs;
mod listener;
