use crate::av::SeekMode;
use crate::error::{CompressError, Result};

/// Per-track sample timing a [`SelectionCursor`] walks over.
pub(crate) trait SampleTable {
    fn sample_count(&self) -> usize;

    /// Time used to interleave selected tracks.
    fn decode_time_us(&self, sample: usize) -> i64;

    fn presentation_time_us(&self, sample: usize) -> i64;

    fn is_sync(&self, sample: usize) -> bool;
}

/// Read position over the selected tracks of a container.
///
/// Each track advances in stored order; across tracks the sample with the
/// lowest decode time is current, ties going to the lower track index.
#[derive(Debug, Clone)]
pub(crate) struct SelectionCursor {
    selected: Vec<bool>,
    positions: Vec<usize>,
}

impl SelectionCursor {
    pub(crate) fn new(track_count: usize) -> Self {
        Self {
            selected: vec![false; track_count],
            positions: vec![0; track_count],
        }
    }

    pub(crate) fn select(&mut self, track: usize) -> Result<()> {
        let slot = self.selected.get_mut(track).ok_or_else(|| {
            CompressError::Container(format!("track {} out of range", track))
        })?;
        *slot = true;
        Ok(())
    }

    /// Current `(track, sample)`, or `None` once every selected track is
    /// exhausted.
    pub(crate) fn current<T: SampleTable>(&self, tables: &[T]) -> Option<(usize, usize)> {
        self.selected
            .iter()
            .enumerate()
            .filter(|(_, selected)| **selected)
            .filter_map(|(track, _)| {
                let table = tables.get(track)?;
                let sample = self.positions[track];
                (sample < table.sample_count()).then(|| (track, sample))
            })
            .min_by_key(|(track, sample)| (tables[*track].decode_time_us(*sample), *track))
    }

    pub(crate) fn advance<T: SampleTable>(&mut self, tables: &[T]) -> bool {
        match self.current(tables) {
            Some((track, _)) => {
                self.positions[track] += 1;
                self.current(tables).is_some()
            }
            None => false,
        }
    }

    pub(crate) fn seek<T: SampleTable>(&mut self, tables: &[T], time_us: i64, mode: SeekMode) {
        for track in 0..self.selected.len() {
            if !self.selected[track] {
                continue;
            }
            if let Some(table) = tables.get(track) {
                self.positions[track] = seek_position(table, time_us, mode);
            }
        }
    }
}

fn seek_position<T: SampleTable>(table: &T, time_us: i64, mode: SeekMode) -> usize {
    let count = table.sample_count();
    let any_sync = (0..count).any(|i| table.is_sync(i));
    let syncs: Vec<usize> = (0..count)
        .filter(|i| !any_sync || table.is_sync(*i))
        .collect();

    let Some(first) = syncs.first().copied() else {
        return count;
    };

    match mode {
        SeekMode::PreviousSync => syncs
            .iter()
            .rev()
            .find(|i| table.presentation_time_us(**i) <= time_us)
            .copied()
            .unwrap_or(first),
        SeekMode::NextSync => syncs
            .iter()
            .find(|i| table.presentation_time_us(**i) >= time_us)
            .copied()
            .unwrap_or(count),
        SeekMode::ClosestSync => syncs
            .iter()
            .min_by_key(|i| ((table.presentation_time_us(**i) - time_us).abs(), **i))
            .copied()
            .unwrap_or(first),
    }
}
