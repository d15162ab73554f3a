pub mod average;
pub mod check;
pub mod pstates;
pub mod run;
