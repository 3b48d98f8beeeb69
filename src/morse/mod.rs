// Module morse - Alphabet, calcul des durées (vitesse, gap, pondération) et réception

pub mod alphabet;
pub mod receiver;
pub mod timing;

pub use receiver::{ReceivedCharacter, Receiver, ReceiverState};
pub use timing::{DOT_CALIBRATION, SendTimings, TimingSynchronizer};
