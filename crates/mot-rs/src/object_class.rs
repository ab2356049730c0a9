use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic label of a detected or tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Unknown,
    Car,
    Truck,
    Bus,
    Trailer,
    Motorcycle,
    Bicycle,
    Pedestrian,
}

impl ObjectClass {
    /// Every class, in label order.
    pub const ALL: [ObjectClass; 8] = [
        ObjectClass::Unknown,
        ObjectClass::Car,
        ObjectClass::Truck,
        ObjectClass::Bus,
        ObjectClass::Trailer,
        ObjectClass::Motorcycle,
        ObjectClass::Bicycle,
        ObjectClass::Pedestrian,
    ];

    /// Position of the class in [`ObjectClass::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Returns true for the four-wheeled vehicle family.
    pub fn is_vehicle(&self) -> bool {
        matches!(
            self,
            ObjectClass::Car | ObjectClass::Truck | ObjectClass::Bus | ObjectClass::Trailer
        )
    }

    /// Returns true for motorcycles and bicycles.
    pub fn is_two_wheeler(&self) -> bool {
        matches!(self, ObjectClass::Motorcycle | ObjectClass::Bicycle)
    }

    /// Returns true if a track of one class may explain a detection of the other.
    ///
    /// `Unknown` is compatible with every class. Otherwise classes are
    /// compatible only within their family (vehicles, two-wheelers, pedestrians).
    pub fn is_compatible(&self, other: &ObjectClass) -> bool {
        if *self == ObjectClass::Unknown || *other == ObjectClass::Unknown {
            return true;
        }
        self == other
            || (self.is_vehicle() && other.is_vehicle())
            || (self.is_two_wheeler() && other.is_two_wheeler())
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectClass::Unknown => "unknown",
            ObjectClass::Car => "car",
            ObjectClass::Truck => "truck",
            ObjectClass::Bus => "bus",
            ObjectClass::Trailer => "trailer",
            ObjectClass::Motorcycle => "motorcycle",
            ObjectClass::Bicycle => "bicycle",
            ObjectClass::Pedestrian => "pedestrian",
        };
        f.write_str(name)
    }
}
