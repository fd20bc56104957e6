use crate::protos::{DeviceRange, NormalizedPosition, PositionSpace};
use crate::schedule::Setpoint;

/// Human-unit domain of one axis (degrees or zoom ratio).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineeringRange {
    pub min: f64,
    pub max: f64,
}

impl EngineeringRange {
    pub const PAN: EngineeringRange = EngineeringRange { min: -180.0, max: 180.0 };
    pub const TILT: EngineeringRange = EngineeringRange { min: -8.0, max: 90.0 };
    pub const ZOOM: EngineeringRange = EngineeringRange { min: 1.0, max: 36.0 };

    fn span(&self) -> f64 {
        let span = self.max - self.min;
        assert!(
            span != 0.0 && span.is_finite(),
            "degenerate engineering range [{}, {}]",
            self.min,
            self.max
        );
        span
    }
}

/// A device speaks the bipolar convention only when it declares exactly [-1, 1].
pub fn is_bipolar(range: &DeviceRange) -> bool {
    range.min == -1.0 && range.max == 1.0
}

/// Guess the convention from a raw reading when no declared range is at hand.
/// Anything inside [-1, 1] is read as bipolar, which misreads unipolar
/// devices; prefer the declared range whenever it was fetched.
pub fn infer_range(raw: f64) -> DeviceRange {
    if (-1.0..=1.0).contains(&raw) {
        DeviceRange::BIPOLAR
    } else {
        DeviceRange::UNIPOLAR
    }
}

pub fn to_device(value: f64, eng: EngineeringRange, device: DeviceRange) -> f64 {
    let span = eng.span();
    let normalized = if is_bipolar(&device) {
        2.0 * (value - eng.min) / span - 1.0
    } else {
        (value - eng.min) / span
    };
    device.clamp(normalized)
}

pub fn to_engineering(normalized: f64, device: DeviceRange, eng: EngineeringRange) -> f64 {
    let span = eng.span();
    if is_bipolar(&device) {
        (normalized + 1.0) / 2.0 * span + eng.min
    } else {
        normalized * span + eng.min
    }
}

pub fn setpoint_to_device(sp: &Setpoint, space: &PositionSpace) -> NormalizedPosition {
    NormalizedPosition {
        pan: to_device(sp.pan_degrees, EngineeringRange::PAN, space.pan),
        tilt: to_device(sp.tilt_degrees, EngineeringRange::TILT, space.tilt),
        zoom: to_device(sp.zoom_ratio, EngineeringRange::ZOOM, space.zoom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WIDE: DeviceRange = DeviceRange { min: 0.0, max: 2.0 };

    #[test]
    fn test_bipolar_endpoints() {
        let b = DeviceRange::BIPOLAR;
        assert_eq!(to_device(-180.0, EngineeringRange::PAN, b), -1.0);
        assert_eq!(to_device(0.0, EngineeringRange::PAN, b), 0.0);
        assert_eq!(to_device(180.0, EngineeringRange::PAN, b), 1.0);
    }

    #[test]
    fn test_unipolar_midpoint() {
        let u = DeviceRange::UNIPOLAR;
        assert_eq!(to_device(0.0, EngineeringRange::PAN, u), 0.5);
        assert_eq!(to_device(1.0, EngineeringRange::ZOOM, u), 0.0);
        assert_eq!(to_device(36.0, EngineeringRange::ZOOM, u), 1.0);
    }

    #[test]
    fn test_out_of_range_pan_clamps_to_device_max() {
        assert_eq!(to_device(500.0, EngineeringRange::PAN, DeviceRange::BIPOLAR), 1.0);
        assert_eq!(to_device(500.0, EngineeringRange::PAN, DeviceRange::UNIPOLAR), 1.0);
        let narrow = DeviceRange { min: 0.1, max: 0.9 };
        assert_eq!(to_device(500.0, EngineeringRange::PAN, narrow), 0.9);
        assert_eq!(to_device(-500.0, EngineeringRange::PAN, narrow), 0.1);
    }

    #[test]
    fn test_near_bipolar_range_is_unipolar() {
        let r = DeviceRange { min: -1.0, max: 0.999 };
        assert!(!is_bipolar(&r));
        assert_eq!(to_device(0.0, EngineeringRange::PAN, r), 0.5);
    }

    #[test]
    #[should_panic(expected = "degenerate engineering range")]
    fn test_degenerate_engineering_range_panics() {
        let flat = EngineeringRange { min: 5.0, max: 5.0 };
        to_device(5.0, flat, DeviceRange::UNIPOLAR);
    }

    #[test]
    #[should_panic(expected = "degenerate engineering range")]
    fn test_degenerate_range_panics_on_reverse() {
        let flat = EngineeringRange { min: 1.0, max: 1.0 };
        to_engineering(0.3, DeviceRange::UNIPOLAR, flat);
    }

    #[test]
    fn test_infer_range_heuristic() {
        assert_eq!(infer_range(0.0), DeviceRange::BIPOLAR);
        assert_eq!(infer_range(-1.0), DeviceRange::BIPOLAR);
        assert_eq!(infer_range(1.5), DeviceRange::UNIPOLAR);
        // reported as bipolar even though a unipolar device could produce it
        assert_eq!(infer_range(0.75), DeviceRange::BIPOLAR);
    }

    #[test]
    fn test_setpoint_to_device() {
        let space = PositionSpace {
            pan: DeviceRange::BIPOLAR,
            tilt: DeviceRange::BIPOLAR,
            zoom: DeviceRange::UNIPOLAR,
        };
        let sp = Setpoint { time_offset_seconds: 0.0, pan_degrees: 90.0, tilt_degrees: 41.0, zoom_ratio: 36.0 };
        let pos = setpoint_to_device(&sp, &space);
        assert!((pos.pan - 0.5).abs() < 1e-12);
        assert!((pos.tilt - 0.0).abs() < 1e-12);
        assert_eq!(pos.zoom, 1.0);
    }

    fn any_device_range() -> impl Strategy<Value = DeviceRange> {
        prop_oneof![
            Just(DeviceRange::BIPOLAR),
            Just(DeviceRange::UNIPOLAR),
            Just(WIDE),
            (-2.0f64..2.0, 0.0f64..2.0).prop_map(|(min, len)| DeviceRange { min, max: min + len }),
        ]
    }

    proptest! {
        #[test]
        fn prop_output_within_device_range(v in -1000.0f64..1000.0, range in any_device_range()) {
            let n = to_device(v, EngineeringRange::PAN, range);
            prop_assert!(n >= range.min && n <= range.max);
        }

        #[test]
        fn prop_unclamped_in_convention(v in -180.0f64..=180.0) {
            let b = to_device(v, EngineeringRange::PAN, DeviceRange::BIPOLAR);
            prop_assert!((-1.0..=1.0).contains(&b));
            let u = to_device(v, EngineeringRange::PAN, WIDE);
            prop_assert!((0.0..=1.0).contains(&u));
        }

        #[test]
        fn prop_round_trip_bipolar(v in -179.99f64..179.99) {
            let b = DeviceRange::BIPOLAR;
            let back = to_engineering(to_device(v, EngineeringRange::PAN, b), b, EngineeringRange::PAN);
            prop_assert!((back - v).abs() < 1e-9);
        }

        #[test]
        fn prop_round_trip_unipolar(v in 1.01f64..35.99) {
            let u = DeviceRange::UNIPOLAR;
            let back = to_engineering(to_device(v, EngineeringRange::ZOOM, u), u, EngineeringRange::ZOOM);
            prop_assert!((back - v).abs() < 1e-9);
        }

        #[test]
        fn prop_round_trip_tilt_both(v in -7.99f64..89.99) {
            for r in [DeviceRange::BIPOLAR, DeviceRange::UNIPOLAR] {
                let back = to_engineering(to_device(v, EngineeringRange::TILT, r), r, EngineeringRange::TILT);
                prop_assert!((back - v).abs() < 1e-9);
            }
        }
    }
}
