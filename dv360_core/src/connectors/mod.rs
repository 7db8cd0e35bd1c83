pub mod dv360;
