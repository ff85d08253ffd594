//! Fake sensors for nodes without hardware: slowly drifting temperature, light
//! levels around a random decade, and noisy humidity.

use geoware_core::sensor::{ReadFn, SensorSpec};
use geoware_core::{GeoNode, NodeError, SensorType, Value, ValueKind};
use rand::Rng;

pub const TEMPERATURE: SensorType = SensorType(1);
pub const LIGHT: SensorType = SensorType(2);
pub const HUMIDITY: SensorType = SensorType(3);

/// Look up a sensor by its name, as typed in the shell.
pub fn by_name(name: &str) -> Option<SensorType> {
    match name {
        "temperature" | "temp" => Some(TEMPERATURE),
        "light" => Some(LIGHT),
        "humidity" => Some(HUMIDITY),
        _ => name.parse().ok().map(SensorType),
    }
}

pub fn register_all(node: &mut GeoNode) -> Result<(), NodeError> {
    node.register_sensor(spec(TEMPERATURE, "temperature", ValueKind::F32), temperature())?;
    node.register_sensor(spec(LIGHT, "light", ValueKind::U16), light())?;
    node.register_sensor(spec(HUMIDITY, "humidity", ValueKind::U8), humidity())?;
    Ok(())
}

fn spec(id: SensorType, name: &str, kind: ValueKind) -> SensorSpec {
    SensorSpec {
        id,
        name: name.to_string(),
        kind,
    }
}

/// Celsius. Baseline moves by up to one degree every fifth read; each read adds 0.0-0.5.
fn temperature() -> ReadFn {
    let mut baseline = 20.0f32;
    let mut count = 0u8;
    Box::new(move || {
        let mut rng = rand::thread_rng();
        count = count.wrapping_add(1);
        if count % 5 == 0 {
            baseline += f32::from(rng.gen_range(0u8..=20)) / 10.0 - 1.0;
        }
        Value::F32(baseline + f32::from(rng.gen_range(0u8..6)) / 10.0)
    })
}

/// Lux. Starts at 5, 50, 500, 5000 or 50000 and creeps up by tenths.
fn light() -> ReadFn {
    let mut baseline: Option<u16> = None;
    let mut count = 0u8;
    Box::new(move || {
        let mut rng = rand::thread_rng();
        let base = *baseline.get_or_insert_with(|| 5 * 10u16.pow(rng.gen_range(0..5)));
        count = (count + 1) % 100;
        let base = if count % 5 == 0 {
            base.saturating_add(rng.gen_range(0..3) * (base / 10))
        } else {
            base
        };
        baseline = Some(base);
        let noise = match base / 10 {
            0 => 0,
            tenth => rng.gen_range(0..tenth),
        };
        Value::U16(base.saturating_add(noise))
    })
}

/// Percent, 50-59.
fn humidity() -> ReadFn {
    Box::new(|| Value::U8(50 + rand::thread_rng().gen_range(0..10)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_return_declared_kinds_and_ranges() {
        let mut t = temperature();
        let mut l = light();
        let mut h = humidity();
        for _ in 0..50 {
            match t() {
                Value::F32(v) => assert!((5.0..35.0).contains(&v), "{}", v),
                other => panic!("temperature returned {:?}", other),
            }
            assert!(matches!(l(), Value::U16(v) if v >= 5));
            assert!(matches!(h(), Value::U8(v) if (50..60).contains(&v)));
        }
    }

    #[test]
    fn names_resolve() {
        assert_eq!(by_name("temp"), Some(TEMPERATURE));
        assert_eq!(by_name("humidity"), Some(HUMIDITY));
        assert_eq!(by_name("9"), Some(SensorType(9)));
        assert_eq!(by_name("pressure"), None);
    }

    #[test]
    fn register_all_fits_default_node() {
        let mut node = GeoNode::with_seed(
            geoware_core::Address::new(1, 0),
            geoware_core::Position::default(),
            geoware_core::Config::default(),
            1,
        );
        register_all(&mut node).unwrap();
        assert_eq!(node.sensors().specs().count(), 3);
    }
}
