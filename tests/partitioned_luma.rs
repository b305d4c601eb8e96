use grayfade::{
    Channels, Dims, Exec, Partition, PixelBuffer, luma::luma_region, luma::to_grayscale,
    merge_rows,
};

fn noisy(rows: usize, cols: usize, seed: usize) -> PixelBuffer {
    let data = (0..rows * cols * 3)
        .map(|i| ((i * 2654435761usize + seed) >> 7) as u8)
        .collect();
    PixelBuffer::from_raw(Dims::new(rows, cols), Channels::Rgb, data).unwrap()
}

#[test]
fn gathered_partitions_equal_single_worker_grayscale() {
    for (rows, cols) in [(1, 1), (2, 3), (7, 5), (16, 9), (31, 4)] {
        let color = noisy(rows, cols, rows * 17 + cols);
        let whole = to_grayscale(&color, Exec::Sequential).unwrap();

        for workers in 1..=rows {
            let partition = Partition::new(rows, workers).unwrap();
            let contributions = partition
                .ranges()
                .iter()
                .map(|&range| {
                    let mut out = vec![0u8; range.len() * cols];
                    luma_region(&color, range, &mut out, Exec::Sequential).unwrap();
                    out
                })
                .collect();
            let merged = merge_rows(&partition, contributions, cols).unwrap();
            assert_eq!(
                merged,
                whole.as_bytes(),
                "rows={rows} cols={cols} workers={workers}"
            );
        }
    }
}

#[test]
fn merging_with_a_different_partition_is_detected() {
    let color = noisy(10, 2, 3);
    let produced = Partition::new(10, 3).unwrap();
    let contributions: Vec<Vec<u8>> = produced
        .ranges()
        .iter()
        .map(|&range| {
            let mut out = vec![0u8; range.len() * 2];
            luma_region(&color, range, &mut out, Exec::Parallel).unwrap();
            out
        })
        .collect();

    // 10 rows over 3 workers is 3/3/4; over 3 workers with 11 rows it would be 3/3/5.
    let other = Partition::new(11, 3).unwrap();
    let err = merge_rows(&other, contributions, 2).unwrap_err();
    assert!(err.is_transport());
}
