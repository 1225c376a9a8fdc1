//! Converter registry and shortest-path resolution (§4.7).
//!
//! A read-mostly map guarded by `parking_lot::RwLock`, write-rare
//! registration, in the shape of `fc-resilience::CircuitBreakerRegistry`,
//! with an additional path cache invalidated on every write.

use crate::converter::{ConversionPath, ConversionStep, MessageConverter, MessageVersion, Payload};
use fc_common::cancellation::CancellationToken;
use fc_common::error::CoreError;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

type CacheKey = (String, MessageVersion, MessageVersion);

pub struct ConverterRegistry {
    converters: RwLock<HashMap<String, Vec<Arc<dyn MessageConverter>>>>,
    path_cache: RwLock<HashMap<CacheKey, Option<ConversionPath>>>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
            path_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `converter` for `message_type`. Invalidates every cached
    /// path for that type: a new converter can shorten existing routes.
    pub fn register(&self, message_type: impl Into<String>, converter: Arc<dyn MessageConverter>) {
        let message_type = message_type.into();
        let (min, max) = converter.supported_range();
        if min > max {
            tracing::warn!(message_type, %min, %max, "converter registered with an inverted supported_range, min must be <= max");
        }
        self.converters.write().entry(message_type.clone()).or_default().push(converter);
        self.path_cache.write().retain(|(t, _, _), _| t != &message_type);
    }

    /// Drops every registered converter and cached path.
    pub fn clear(&self) {
        self.converters.write().clear();
        self.path_cache.write().clear();
    }

    pub fn find_path(&self, message_type: &str, from: MessageVersion, to: MessageVersion) -> Option<ConversionPath> {
        if from == to {
            return Some(ConversionPath::empty());
        }

        let key = (message_type.to_string(), from, to);
        if let Some(cached) = self.path_cache.read().get(&key) {
            return cached.clone();
        }

        let path = self.compute_path(message_type, from, to);
        self.path_cache.write().insert(key, path.clone());
        path
    }

    fn converters_for(&self, message_type: &str) -> Vec<Arc<dyn MessageConverter>> {
        self.converters.read().get(message_type).cloned().unwrap_or_default()
    }

    /// A converter whose `[min, max]` range encloses both `a` and `b` can
    /// step directly between them, in either direction.
    fn edge_converter(converters: &[Arc<dyn MessageConverter>], a: MessageVersion, b: MessageVersion) -> Option<Arc<dyn MessageConverter>> {
        converters
            .iter()
            .find(|c| {
                let (min, max) = c.supported_range();
                min <= a && a <= max && min <= b && b <= max
            })
            .cloned()
    }

    fn compute_path(&self, message_type: &str, from: MessageVersion, to: MessageVersion) -> Option<ConversionPath> {
        let converters = self.converters_for(message_type);
        if converters.is_empty() {
            return None;
        }

        // A converter spanning both endpoints directly always wins: any
        // registered direct (a, b) converter produces a length-1 path
        // regardless of what multi-hop routes also exist.
        if let Some(direct) = Self::edge_converter(&converters, from, to) {
            return Some(ConversionPath {
                steps: vec![ConversionStep { from, to, converter: direct }],
            });
        }

        // Otherwise BFS over the waypoint graph: nodes are `from`, `to`,
        // and every converter's range endpoints; two waypoints are
        // adjacent if some converter's range encloses both.
        let mut waypoints: HashSet<MessageVersion> = HashSet::new();
        waypoints.insert(from);
        waypoints.insert(to);
        for converter in &converters {
            let (min, max) = converter.supported_range();
            waypoints.insert(min);
            waypoints.insert(max);
        }
        let waypoints: Vec<MessageVersion> = waypoints.into_iter().collect();

        let mut predecessor: HashMap<MessageVersion, MessageVersion> = HashMap::new();
        let mut visited: HashSet<MessageVersion> = HashSet::new();
        visited.insert(from);
        let mut queue = VecDeque::new();
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            if current == to {
                break;
            }
            for &candidate in &waypoints {
                if visited.contains(&candidate) {
                    continue;
                }
                if Self::edge_converter(&converters, current, candidate).is_some() {
                    visited.insert(candidate);
                    predecessor.insert(candidate, current);
                    queue.push_back(candidate);
                }
            }
        }

        if !visited.contains(&to) {
            return None;
        }

        let mut chain = vec![to];
        let mut cursor = to;
        while cursor != from {
            let prev = *predecessor.get(&cursor)?;
            chain.push(prev);
            cursor = prev;
        }
        chain.reverse();

        let mut steps = Vec::with_capacity(chain.len() - 1);
        for pair in chain.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let converter = Self::edge_converter(&converters, a, b)?;
            steps.push(ConversionStep { from: a, to: b, converter });
        }
        Some(ConversionPath { steps })
    }

    /// Applies `find_path`'s result in order. Fails with
    /// `ConversionPathMissing` if no path exists, or wraps a converter's
    /// own failure with the index of the step that failed.
    pub async fn convert_to(
        &self,
        message_type: &str,
        msg: Payload,
        from: MessageVersion,
        to: MessageVersion,
        cancellation: &CancellationToken,
    ) -> Result<Payload, CoreError> {
        let path = self
            .find_path(message_type, from, to)
            .ok_or_else(|| CoreError::Conversion {
                message: format!("no conversion path from {from} to {to} for message type '{message_type}'"),
            })?;

        let mut current = msg;
        for (index, step) in path.steps.iter().enumerate() {
            current = step
                .converter
                .convert(current, step.from, step.to, cancellation)
                .await
                .map_err(|err| CoreError::Conversion {
                    message: format!("conversion step {index} ({} -> {}) failed: {err}", step.from, step.to),
                })?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StepConverter {
        min: MessageVersion,
        max: MessageVersion,
        fails: bool,
    }

    #[async_trait]
    impl MessageConverter for StepConverter {
        fn supported_range(&self) -> (MessageVersion, MessageVersion) {
            (self.min, self.max)
        }

        async fn convert(
            &self,
            msg: Payload,
            from: MessageVersion,
            to: MessageVersion,
            _cancellation: &CancellationToken,
        ) -> Result<Payload, CoreError> {
            if self.fails {
                return Err(CoreError::handler("converter exploded"));
            }
            let mut msg = msg;
            if let Some(history) = msg["history"].as_array_mut() {
                history.push(serde_json::json!(format!("{from}->{to}")));
            }
            Ok(msg)
        }
    }

    fn v(major: u32, minor: u32, patch: u32) -> MessageVersion {
        MessageVersion::new(major, minor, patch)
    }

    #[test]
    fn same_version_returns_empty_path() {
        let registry = ConverterRegistry::new();
        let path = registry.find_path("order", v(1, 0, 0), v(1, 0, 0)).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn no_registered_converters_means_no_path() {
        let registry = ConverterRegistry::new();
        assert!(registry.find_path("order", v(1, 0, 0), v(2, 0, 0)).is_none());
    }

    #[test]
    fn a_direct_converter_always_yields_a_length_one_path() {
        let registry = ConverterRegistry::new();
        registry.register("order", Arc::new(StepConverter { min: v(1, 0, 0), max: v(2, 0, 0), fails: false }));
        registry.register("order", Arc::new(StepConverter { min: v(1, 0, 0), max: v(1, 1, 0), fails: false }));
        registry.register("order", Arc::new(StepConverter { min: v(1, 1, 0), max: v(2, 0, 0), fails: false }));

        let path = registry.find_path("order", v(1, 0, 0), v(2, 0, 0)).unwrap();
        assert_eq!(path.len(), 1, "a converter spanning both endpoints must win outright");
    }

    #[test]
    fn multi_hop_path_chains_through_waypoints() {
        let registry = ConverterRegistry::new();
        registry.register("order", Arc::new(StepConverter { min: v(1, 0, 0), max: v(1, 1, 0), fails: false }));
        registry.register("order", Arc::new(StepConverter { min: v(1, 1, 0), max: v(1, 2, 0), fails: false }));

        let path = registry.find_path("order", v(1, 0, 0), v(1, 2, 0)).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.steps[0].to, v(1, 1, 0));
        assert_eq!(path.steps[1].from, v(1, 1, 0));
    }

    #[tokio::test]
    async fn convert_to_applies_steps_in_order() {
        let registry = ConverterRegistry::new();
        registry.register("order", Arc::new(StepConverter { min: v(1, 0, 0), max: v(1, 1, 0), fails: false }));
        registry.register("order", Arc::new(StepConverter { min: v(1, 1, 0), max: v(1, 2, 0), fails: false }));

        let msg = serde_json::json!({ "history": [] });
        let result = registry
            .convert_to("order", msg, v(1, 0, 0), v(1, 2, 0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["history"], serde_json::json!(["1.0.0->1.1.0", "1.1.0->1.2.0"]));
    }

    #[tokio::test]
    async fn convert_to_without_a_path_raises_conversion_path_missing() {
        let registry = ConverterRegistry::new();
        let err = registry
            .convert_to("order", serde_json::json!({}), v(1, 0, 0), v(9, 0, 0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), fc_common::error::ErrorKind::Conversion);
    }

    #[tokio::test]
    async fn a_failing_step_is_wrapped_with_its_index() {
        let registry = ConverterRegistry::new();
        registry.register("order", Arc::new(StepConverter { min: v(1, 0, 0), max: v(2, 0, 0), fails: true }));
        let err = registry
            .convert_to("order", serde_json::json!({}), v(1, 0, 0), v(2, 0, 0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("step 0"));
    }

    #[test]
    fn registering_a_new_converter_invalidates_the_cached_path() {
        let registry = ConverterRegistry::new();
        assert!(registry.find_path("order", v(1, 0, 0), v(2, 0, 0)).is_none());
        registry.register("order", Arc::new(StepConverter { min: v(1, 0, 0), max: v(2, 0, 0), fails: false }));
        assert!(registry.find_path("order", v(1, 0, 0), v(2, 0, 0)).is_some());
    }
}
