pub mod d402_mp_overview;
