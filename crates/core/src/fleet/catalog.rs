//! Fleet layout catalog: the valid machine codes per layout.

use std::collections::HashSet;

use crate::config::FleetConfig;

use super::{LayoutFamily, NewMachine};

/// Machine codes per layout, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetCatalog {
    layout_a: Vec<String>,
    layout_b: Vec<String>,
}

fn numbered(prefix: &str, range: std::ops::RangeInclusive<u32>) -> impl Iterator<Item = String> + '_ {
    range.map(move |n| format!("{}{}", prefix, n))
}

/// Built-in plant layout A: CD1-CD24, CI1-CI4, F1-F24.
pub fn builtin_layout_a() -> Vec<String> {
    numbered("CD", 1..=24)
        .chain(numbered("CI", 1..=4))
        .chain(numbered("F", 1..=24))
        .collect()
}

/// Built-in plant layout B: CT1-CT24, U1-U33, N1-N10.
pub fn builtin_layout_b() -> Vec<String> {
    numbered("CT", 1..=24)
        .chain(numbered("U", 1..=33))
        .chain(numbered("N", 1..=10))
        .collect()
}

impl Default for FleetCatalog {
    fn default() -> Self {
        Self {
            layout_a: builtin_layout_a(),
            layout_b: builtin_layout_b(),
        }
    }
}

impl FleetCatalog {
    pub fn new(layout_a: Vec<String>, layout_b: Vec<String>) -> Self {
        Self { layout_a, layout_b }
    }

    /// Built-in layouts, overridden per layout by the config lists.
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            layout_a: config.layout_a.clone().unwrap_or_else(builtin_layout_a),
            layout_b: config.layout_b.clone().unwrap_or_else(builtin_layout_b),
        }
    }

    pub fn codes(&self, layout: LayoutFamily) -> &[String] {
        match layout {
            LayoutFamily::A => &self.layout_a,
            LayoutFamily::B => &self.layout_b,
        }
    }

    pub fn len(&self) -> usize {
        self.layout_a.len() + self.layout_b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every machine to provision, in floor-plan order.
    pub fn machines(&self) -> Vec<NewMachine> {
        LayoutFamily::ALL
            .into_iter()
            .flat_map(|layout| {
                self.codes(layout)
                    .iter()
                    .enumerate()
                    .map(move |(i, code)| NewMachine {
                        layout,
                        code: code.clone(),
                        position: i as u32 + 1,
                    })
            })
            .collect()
    }

    /// Codes must be non-empty and unique across the whole fleet.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for layout in LayoutFamily::ALL {
            for code in self.codes(layout) {
                let code = code.trim();
                if code.is_empty() {
                    return Err(format!("layout {} contains an empty machine code", layout));
                }
                if !seen.insert(code.to_ascii_uppercase()) {
                    return Err(format!("machine code {} appears more than once", code));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_layout_sizes() {
        let catalog = FleetCatalog::default();
        assert_eq!(catalog.codes(LayoutFamily::A).len(), 52);
        assert_eq!(catalog.codes(LayoutFamily::B).len(), 67);
        assert_eq!(catalog.codes(LayoutFamily::A)[0], "CD1");
        assert_eq!(catalog.codes(LayoutFamily::B).last().unwrap(), "N10");
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_machines_are_positioned_per_layout() {
        let catalog = FleetCatalog::new(vec!["X1".into(), "X2".into()], vec!["Y1".into()]);
        let machines = catalog.machines();
        assert_eq!(machines.len(), 3);
        assert_eq!(machines[1].id(), "a-X2");
        assert_eq!(machines[1].position, 2);
        assert_eq!(machines[2].id(), "b-Y1");
        assert_eq!(machines[2].position, 1);
    }

    #[test]
    fn test_config_overrides_single_layout() {
        let config = FleetConfig {
            layout_a: Some(vec!["T1".into()]),
            layout_b: None,
        };
        let catalog = FleetCatalog::from_config(&config);
        assert_eq!(catalog.codes(LayoutFamily::A), ["T1".to_string()]);
        assert_eq!(catalog.codes(LayoutFamily::B).len(), 67);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_blanks() {
        let dup = FleetCatalog::new(vec!["CD1".into()], vec!["cd1".into()]);
        assert!(dup.validate().unwrap_err().contains("more than once"));

        let blank = FleetCatalog::new(vec![" ".into()], vec![]);
        assert!(blank.validate().unwrap_err().contains("empty"));
    }
}
