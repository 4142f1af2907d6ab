// Dashboard handlers
pub mod d402_mp_overview;
