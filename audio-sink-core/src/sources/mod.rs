pub mod sine;
