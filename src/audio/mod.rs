pub mod capture;
pub mod listener;
pub mod resample;
