/// Units which are simply type aliases for `f32` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// The projector's inner loops run over millions of LORs per iteration, and
/// work in plain millimetres. These aliases give some clue in the source as to
/// what the numbers represent.

pub type Lengthf32    = f32;
pub type Weightf32    = f32;
pub type Ratiof32     = f32;
pub type Intensityf32 = f32;
