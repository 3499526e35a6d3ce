pub mod normalize;
pub mod sensor_tree;
pub mod upstream;

use crate::collectors::normalize::normalize;
use crate::collectors::sensor_tree::{disk_used_space, find_value, SensorNode};
use std::collections::BTreeMap;

/// Normalized readings taken from one sensor tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReadings {
    pub cpu_usage: f64,
    pub cpu_temp: f64,
    pub cpu_power: f64,
    pub gpu_usage: f64,
    pub gpu_temp: f64,
    pub gpu_power: f64,
    pub ram_usage_gb: f64,
    pub disks: BTreeMap<String, f64>,
}

pub fn extract_readings(tree: &SensorNode, disks: &[String]) -> SensorReadings {
    let read = |name: &str, parent: &str| normalize(find_value(tree, name, Some(parent)));

    SensorReadings {
        cpu_usage: read("CPU Total", "Load"),
        cpu_temp: read("CPU Package", "Temperatures"),
        cpu_power: read("CPU Package", "Powers"),
        gpu_usage: read("GPU Core", "Load"),
        gpu_temp: read("GPU Core", "Temperatures"),
        gpu_power: read("GPU Power", "Powers"),
        ram_usage_gb: read("Used Memory", "Data"),
        disks: disks
            .iter()
            .map(|d| (d.clone(), normalize(disk_used_space(tree, d))))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_metrics_and_zeroes_missing_ones() {
        let tree = SensorNode::new("Sensor")
            .with_child(
                SensorNode::new("CPU")
                    .with_child(SensorNode::new("Load").with_child(SensorNode::new("CPU Total").with_value("33,3 %")))
                    .with_child(
                        SensorNode::new("Temperatures")
                            .with_child(SensorNode::new("CPU Package").with_value("55,0 °C")),
                    ),
            )
            .with_child(
                SensorNode::new("Memory")
                    .with_child(SensorNode::new("Data").with_child(SensorNode::new("Used Memory").with_value("12,1 GB"))),
            )
            .with_child(
                SensorNode::new("C:").with_child(
                    SensorNode::new("Load").with_child(SensorNode::new("Used Space").with_value("40,0 %")),
                ),
            );

        let readings = extract_readings(&tree, &["C:".to_string(), "D:".to_string()]);
        assert_eq!(readings.cpu_usage, 33.3);
        assert_eq!(readings.cpu_temp, 55.0);
        assert_eq!(readings.cpu_power, 0.0);
        assert_eq!(readings.gpu_usage, 0.0);
        assert_eq!(readings.ram_usage_gb, 12.1);
        assert_eq!(readings.disks.get("C:"), Some(&40.0));
        assert_eq!(readings.disks.get("D:"), Some(&0.0));
    }

    #[test]
    fn first_match_without_value_reads_as_zero() {
        let tree = SensorNode::new("Sensor")
            .with_child(SensorNode::new("Load").with_child(SensorNode::new("CPU Total")))
            .with_child(
                SensorNode::new("Other")
                    .with_child(SensorNode::new("Load").with_child(SensorNode::new("CPU Total").with_value("99,0 %"))),
            );

        let readings = extract_readings(&tree, &[]);
        assert_eq!(readings.cpu_usage, 0.0);
    }
}
