//! Physical quantities used in configuration and at the edges of the
//! projector, expressed in a millimetre/picosecond flavour of `uom`.
//!
//! The inner loops of the projector work on plain `f32`s (see [`todo`]); the
//! quantities in here exist so that users can write `"2 mm"` or `"60 ps"` and
//! have the conversion done once, up front.

pub mod todo;

pub use uom;

pub mod mmps {

  use uom::si::{
    length::millimeter,
    mass::kilogram,
    time::picosecond,
    electric_current::ampere,
    thermodynamic_temperature::kelvin,
    amount_of_substance::mole,
    luminous_intensity::candela,
  };

  // TODO: replace with system! macro, once it has been fixed in uom
  #[allow(unused)]
  type Units = dyn uom::si::Units<
      f32,
    length                    = millimeter,
    mass                      = kilogram,
    time                      = picosecond,
    electric_current          = ampere,
    thermodynamic_temperature = kelvin,
    amount_of_substance       = mole,
    luminous_intensity        = candela>;

  pub mod f32 {
    use uom::{ISQ, system};
    ISQ!(uom::si, f32, (millimeter, kilogram, picosecond, ampere, kelvin, mole, candela));
  }

}

pub use uom::si::Quantity;
pub use mmps::f32::{Length, Time, Velocity};

mod units {
  pub use uom::si::{length  ::{micrometer, millimeter, centimeter},
                    time    ::picosecond,
                    velocity::meter_per_second,
  };
}

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f32) -> $quantity { $quantity::new::<units::$unit>(x) }
  };
}

wrap!(um     Length         micrometer);
wrap!(mm     Length         millimeter);
wrap!(cm     Length         centimeter);
wrap!(ps     Time           picosecond);
wrap!(m_s    Velocity meter_per_second);

// Reverse direction of the above: strip the units, leaving the value in the
// unit which the projector works in.
pub fn mm_(x: Length) -> f32 { x.get::<units::millimeter>() }
pub fn ps_(x: Time  ) -> f32 { x.get::<units::picosecond>() }

/// Speed of light in vacuum
pub fn c() -> Velocity { m_s(299_792_458.0) }

/// Spatial uncertainty along a LOR corresponding to a coincidence timing
/// uncertainty `dt`: the annihilation point moves by half the distance light
/// travels in `dt`.
pub fn tof_time_to_length(dt: Time) -> Length { c() * dt / 2.0 }

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}
