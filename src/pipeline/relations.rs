use serde::{Deserialize, Serialize};

use super::normalize::Component;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub distance: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationships {
    pub connections: Vec<Relationship>,
}

/// Connects every unordered pair whose normalized center distance is below
/// `threshold`. Pairs are enumerated `i < j`.
pub fn analyze_relationships(components: &[Component], threshold: f32) -> Relationships {
    let mut connections = Vec::new();
    for (i, a) in components.iter().enumerate() {
        for b in &components[i + 1..] {
            let distance = (a.center_x - b.center_x).hypot(a.center_y - b.center_y);
            if distance < threshold {
                connections.push(Relationship {
                    from: a.id.clone(),
                    to: b.id.clone(),
                    distance,
                });
            }
        }
    }
    Relationships { connections }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(id: &str, center_x: f32, center_y: f32) -> Component {
        Component {
            id: id.to_string(),
            x: center_x - 0.05,
            y: center_y - 0.05,
            width: 0.1,
            height: 0.1,
            center_x,
            center_y,
            confidence: 0.9,
            area: 0.01,
            label: None,
            description: None,
        }
    }

    #[test]
    fn fewer_than_two_components_have_no_connections() {
        assert!(analyze_relationships(&[], 0.15).connections.is_empty());
        assert!(analyze_relationships(&[at("a", 0.5, 0.5)], 0.15).connections.is_empty());
    }

    #[test]
    fn connects_close_pairs_once() {
        let components = vec![
            at("a", 0.10, 0.10),
            at("b", 0.20, 0.10),
            at("c", 0.80, 0.80),
            at("d", 0.80, 0.90),
        ];
        let out = analyze_relationships(&components, 0.15);
        let pairs: Vec<(&str, &str)> = out
            .connections
            .iter()
            .map(|r| (r.from.as_str(), r.to.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "b"), ("c", "d")]);
        assert!((out.connections[0].distance - 0.1).abs() < 1e-6);
        assert!(out.connections.iter().all(|r| r.distance >= 0.0));
    }

    #[test]
    fn threshold_is_exclusive() {
        let components = vec![at("a", 0.0, 0.0), at("b", 0.5, 0.0)];
        assert!(analyze_relationships(&components, 0.5).connections.is_empty());
        assert_eq!(analyze_relationships(&components, 0.51).connections.len(), 1);
    }

    #[test]
    fn serializes_with_from_and_to() {
        let out = analyze_relationships(&[at("a", 0.0, 0.0), at("b", 0.0, 0.125)], 0.15);
        insta::assert_json_snapshot!(out, @r#"
        {
          "connections": [
            {
              "from": "a",
              "to": "b",
              "distance": 0.125
            }
          ]
        }
        "#);
    }
}
