use crate::dedup::Segment;
use crate::error::{Error, Result};

/// Reconstruct the original data from the reference sources and a sequence of segments.
pub fn apply_segments(sources: &[&[u8]], segments: &[Segment]) -> Result<Vec<u8>> {
    // Every copy is range-checked before reserving, so the capacity is bounded
    // by data that actually exists.
    let mut ranges = Vec::with_capacity(segments.len());
    for segment in segments {
        if let Segment::Copy {
            source,
            offset,
            length,
        } = segment
        {
            ranges.push(copy_range(sources, *source, *offset, *length)?);
        }
    }
    let estimated_size = output_len(segments)?;

    let mut result = Vec::with_capacity(estimated_size as usize);
    let mut ranges = ranges.into_iter();

    for segment in segments {
        match segment {
            Segment::Copy { .. } => {
                if let Some((data, start, end)) = ranges.next() {
                    result.extend_from_slice(&data[start..end]);
                }
            }
            Segment::Insert { data } => {
                result.extend_from_slice(data);
            }
        }
    }

    Ok(result)
}

/// Total number of bytes `segments` produce. A sum that does not fit in `u64`
/// is a format error.
pub fn output_len(segments: &[Segment]) -> Result<u64> {
    segments.iter().try_fold(0u64, |total, segment| {
        total
            .checked_add(segment_len(segment))
            .ok_or_else(|| Error::format(format!("segment lengths overflow after {} bytes", total)))
    })
}

fn copy_range<'a>(
    sources: &[&'a [u8]],
    source: u32,
    offset: u64,
    length: u64,
) -> Result<(&'a [u8], usize, usize)> {
    let data = *sources
        .get(source as usize)
        .ok_or_else(|| Error::format(format!("copy refers to unknown source {}", source)))?;
    let end = offset
        .checked_add(length)
        .filter(|&end| end <= data.len() as u64)
        .ok_or_else(|| {
            Error::format(format!(
                "copy {}+{} is outside source {} ({} bytes)",
                offset,
                length,
                source,
                data.len()
            ))
        })?;
    Ok((data, offset as usize, end as usize))
}

pub fn segment_len(segment: &Segment) -> u64 {
    match segment {
        Segment::Copy { length, .. } => *length,
        Segment::Insert { data } => data.len() as u64,
    }
}
