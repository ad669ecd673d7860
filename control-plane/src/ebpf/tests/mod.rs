//! Pure-logic mirrors of map-manager semantics, exercised without a loaded
//! `aya::Ebpf` object. Matches the teacher's `MockMapManager` idiom: model
//! the same rules the real maps enforce in plain host-testable Rust, rather
//! than mocking the `aya` types themselves.

mod mock_map_manager;
