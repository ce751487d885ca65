//! End-to-end scans: row source, decoding iterator, retrieval and a reference backend wired
//! together the way a query executor would.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use bytes::Bytes;
    use tokio::runtime::Handle;
    use crate::unit_tests::test_support::*;
    use crate::{
        decoding_iterator, AggregationSpec, DataAdapter, DataIndexRetrieval, FieldAggregation,
        FieldProjection, GeoWaveRow, GeoWaveValue, MemoryDataIndex, ObjectStoreDataIndex,
        ObjectStoreRegistry, RetrievalConfig, RetrievalParams,
    };

    /// Keeps only the last value of each record.
    struct KeepLast;

    impl FieldAggregation for KeepLast {
        fn name(&self) -> &str {
            "keep-last"
        }

        fn aggregate(&self, mut values: Vec<GeoWaveValue>) -> Vec<GeoWaveValue> {
            values.split_off(values.len().saturating_sub(1))
        }
    }

    fn feature(id: &str, payload: String) -> TestFeature {
        TestFeature {
            id: id.to_string(),
            payload: payload.into_bytes(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scan_driven_from_blocking_task() {
        let backend = Arc::new(MemoryDataIndex::new().with_fetch_latency(Duration::from_millis(2)));
        let record_ids = ids("b", 25);
        for id in &record_ids {
            backend.insert(FEATURE_ADAPTER, key(id), vec![feature_value(id)]);
        }

        let config = RetrievalConfig::default().with_batch_size(10);
        let retrieval = DataIndexRetrieval::for_backend(backend.clone(), &config, Handle::current()).unwrap();
        let store = adapter_store(&[FEATURE_ADAPTER]);
        let rows: Vec<GeoWaveRow> = record_ids.iter().map(|id| thin_row(id, FEATURE_ADAPTER)).collect();

        let mut emitted = tokio::task::spawn_blocking(move || {
            decoding_iterator(rows, store, Vec::new(), Some(&retrieval), &config).unwrap().collect::<Vec<_>>()
        })
        .await
        .unwrap();
        emitted.sort();

        let mut expected: Vec<TestFeature> = record_ids.iter().map(|id| expected_feature(id)).collect();
        expected.sort();
        assert_eq!(emitted, expected);
        // 10 + 10 on size, the last 5 on exhaustion
        assert_eq!(backend.batch_fetches(), 3);
    }

    #[test]
    fn test_single_key_scan_preserves_scan_order() {
        let runtime = test_runtime();
        let backend = Arc::new(populated_index(FEATURE_ADAPTER, &ids("s", 6)));
        let config = RetrievalConfig::default().with_batch_size(1);
        let retrieval = DataIndexRetrieval::for_backend(backend.clone(), &config, runtime.handle().clone()).unwrap();
        assert!(!retrieval.supports_batching());

        let rows: Vec<GeoWaveRow> = ids("s", 6).iter().rev().map(|id| thin_row(id, FEATURE_ADAPTER)).collect();
        let emitted: Vec<TestFeature> =
            decoding_iterator(rows, adapter_store(&[FEATURE_ADAPTER]), Vec::new(), Some(&retrieval), &config).unwrap().collect();

        let expected: Vec<TestFeature> = ids("s", 6).iter().rev().map(|id| expected_feature(id)).collect();
        assert_eq!(emitted, expected);
        assert_eq!(backend.batch_fetches(), 0);
    }

    #[test]
    fn test_object_store_scan_with_projection() {
        let runtime = test_runtime();
        let registry = ObjectStoreRegistry::new();
        let config = RetrievalConfig::default()
            .with_batch_size(8)
            .with_object_fetch_concurrency(4);
        let index = Arc::new(ObjectStoreDataIndex::open("memory://scenario/data-index", &registry, &config).unwrap());

        let record_ids = ids("o", 20);
        runtime.block_on(async {
            for id in &record_ids {
                index
                    .put(FEATURE_ADAPTER, id.as_bytes(), &[feature_value(id), name_value(id)])
                    .await
                    .unwrap();
            }
        });

        let retrieval = DataIndexRetrieval::batched(index.clone(), config.batch_size, runtime.handle().clone()).unwrap();
        let adapter: &dyn DataAdapter<TestFeature> = &FeatureAdapter { adapter_id: FEATURE_ADAPTER };
        retrieval
            .set_params(RetrievalParams::new().with_projection(FieldProjection::new(["name"], adapter)))
            .unwrap();

        let mut rows: Vec<GeoWaveRow> = record_ids.iter().map(|id| thin_row(id, FEATURE_ADAPTER)).collect();
        rows.push(thin_row("never-written", FEATURE_ADAPTER));

        let mut emitted: Vec<TestFeature> =
            decoding_iterator(rows, adapter_store(&[FEATURE_ADAPTER]), Vec::new(), Some(&retrieval), &config).unwrap().collect();
        emitted.sort();

        let mut expected: Vec<TestFeature> = record_ids
            .iter()
            .map(|id| feature(id, format!("name-{}", id)))
            .collect();
        expected.sort();
        assert_eq!(emitted, expected);
    }

    #[test]
    fn test_parallel_splits_over_two_adapters_with_aggregation() {
        let runtime = test_runtime();
        let backend = Arc::new(MemoryDataIndex::new().with_fetch_latency(Duration::from_millis(1)));
        let record_ids = ids("x", 60);
        let mut expected = Vec::new();
        let mut rows = Vec::new();
        for (i, id) in record_ids.iter().enumerate() {
            let adapter_id = if i % 2 == 0 { FEATURE_ADAPTER } else { OTHER_ADAPTER };
            backend.insert(adapter_id, key(id), vec![feature_value(id), name_value(id)]);
            rows.push(thin_row(id, adapter_id));
            expected.push(if adapter_id == OTHER_ADAPTER {
                feature(id, format!("name-{}", id))
            } else {
                feature(id, format!("geom-{}name-{}", id, id))
            });
        }
        expected.sort();

        let config = RetrievalConfig::default()
            .with_batch_size(5)
            .with_completion_queue_capacity(3);
        let retrieval = DataIndexRetrieval::for_backend(backend.clone(), &config, runtime.handle().clone()).unwrap();
        retrieval
            .set_params(RetrievalParams::new().with_aggregation(AggregationSpec::new(OTHER_ADAPTER, Arc::new(KeepLast))))
            .unwrap();
        let store = adapter_store(&[FEATURE_ADAPTER, OTHER_ADAPTER]);

        let mut emitted: Vec<TestFeature> = std::thread::scope(|scope| {
            let handles: Vec<_> = rows
                .chunks(15)
                .map(|split| {
                    let split = split.to_vec();
                    let store = Arc::clone(&store);
                    let retrieval = &retrieval;
                    let config = &config;
                    scope.spawn(move || {
                        decoding_iterator(split, store, Vec::new(), Some(retrieval), config).unwrap().collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });
        emitted.sort();

        assert_eq!(emitted, expected);
        if let DataIndexRetrieval::Batched(batched) = &retrieval {
            assert_eq!(batched.outstanding_iterators(), 0);
            assert_eq!(batched.pending_count(FEATURE_ADAPTER), 0);
            assert_eq!(batched.pending_count(OTHER_ADAPTER), 0);
        } else {
            panic!("batch size 5 should select batched retrieval");
        }
    }

    #[test]
    fn test_scan_of_data_index_rows_needs_no_lookups() {
        let runtime = test_runtime();
        let backend = Arc::new(populated_index(FEATURE_ADAPTER, &ids("d", 12)));
        let config = RetrievalConfig::default().with_batch_size(4);
        let retrieval = DataIndexRetrieval::for_backend(backend.clone(), &config, runtime.handle().clone()).unwrap();

        let emitted: Vec<TestFeature> = decoding_iterator(
            backend.scan_adapter(FEATURE_ADAPTER),
            adapter_store(&[FEATURE_ADAPTER]),
            Vec::new(),
            Some(&retrieval),
            &config,
        )
        .unwrap()
        .collect();

        assert_eq!(emitted.len(), 12);
        assert_eq!(backend.batch_fetches(), 0);
        assert!(emitted.iter().all(|feature| feature.payload.starts_with(b"geom-")));
        assert_eq!(Bytes::from(emitted[0].id.clone()), key("d0"));
    }
}
