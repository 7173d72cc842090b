use candle_core::Tensor;

use crate::error::PpgsError;
use crate::types::{DatasetItem, EvalBatch, TrainingBatch};
use crate::IGNORE_INDEX;

/// Collate dataset items into a loss-ready padded training batch.
///
/// Output shapes are `(N, C, L_max)` features, `(N, L_max)` labels and
/// `(N,)` lengths, in input order. Label padding is [`IGNORE_INDEX`];
/// feature padding is zero. A single item still yields batched tensors.
pub fn collate_reduced(items: Vec<DatasetItem>) -> Result<TrainingBatch, PpgsError> {
    let ppgs: Vec<&Tensor> = items.iter().map(|item| &item.ppg).collect();
    let indices: Vec<&[i64]> = items.iter().map(|item| item.indices.as_slice()).collect();
    let (padded_ppgs, padded_indices, lengths) = pad_batch(&ppgs, &indices)?;
    Ok(TrainingBatch {
        ppgs: padded_ppgs,
        indices: padded_indices,
        lengths,
    })
}

/// Collate dataset items into a padded evaluation batch, passing the
/// alignments, word breaks, waveforms and stems through in input order.
pub fn collate(items: Vec<DatasetItem>) -> Result<EvalBatch, PpgsError> {
    let ppgs: Vec<&Tensor> = items.iter().map(|item| &item.ppg).collect();
    let indices: Vec<&[i64]> = items.iter().map(|item| item.indices.as_slice()).collect();
    let (padded_ppgs, padded_indices, _) = pad_batch(&ppgs, &indices)?;

    let mut alignments = Vec::with_capacity(items.len());
    let mut word_breaks = Vec::with_capacity(items.len());
    let mut waveforms = Vec::with_capacity(items.len());
    let mut stems = Vec::with_capacity(items.len());
    for item in items {
        alignments.push(item.alignment);
        word_breaks.push(item.word_breaks);
        waveforms.push(item.waveform);
        stems.push(item.stem);
    }

    Ok(EvalBatch {
        ppgs: padded_ppgs,
        indices: padded_indices,
        alignments,
        word_breaks,
        waveforms,
        stems,
    })
}

/// Stack variable-length `(C, Lᵢ)` feature tensors and matching label
/// sequences into fixed-shape padded tensors.
///
/// Shape parameters are computed and validated explicitly up front; a
/// channel-count mismatch between items fails before any buffer is written.
pub fn pad_batch(
    ppgs: &[&Tensor],
    indices: &[&[i64]],
) -> Result<(Tensor, Tensor, Tensor), PpgsError> {
    if ppgs.is_empty() {
        return Err(PpgsError::invalid_input("cannot collate an empty batch"));
    }
    if ppgs.len() != indices.len() {
        return Err(PpgsError::invalid_input(format!(
            "collate received {} feature tensors but {} label sequences",
            ppgs.len(),
            indices.len()
        )));
    }

    let batch = ppgs.len();
    let (channels, _) = ppgs[0]
        .dims2()
        .map_err(|e| PpgsError::runtime("collate feature dims", e))?;
    let mut lengths = Vec::with_capacity(batch);
    for (i, ppg) in ppgs.iter().enumerate() {
        let (item_channels, frames) = ppg
            .dims2()
            .map_err(|e| PpgsError::runtime("collate feature dims", e))?;
        if item_channels != channels {
            return Err(PpgsError::invalid_input(format!(
                "channel count mismatch in batch: item 0 has {channels} channels, item {i} has {item_channels}"
            )));
        }
        if indices[i].len() != frames {
            return Err(PpgsError::invalid_input(format!(
                "item {i} has {frames} frames but {} labels",
                indices[i].len()
            )));
        }
        lengths.push(frames);
    }
    let max_length = lengths.iter().copied().max().unwrap_or(0);
    let device = ppgs[0].device();

    let mut ppg_buffer = vec![0f32; batch * channels * max_length];
    for (i, ppg) in ppgs.iter().enumerate() {
        if lengths[i] == 0 {
            continue;
        }
        let rows = ppg
            .to_vec2::<f32>()
            .map_err(|e| PpgsError::runtime("collate feature read", e))?;
        for (c, row) in rows.iter().enumerate() {
            let offset = (i * channels + c) * max_length;
            ppg_buffer[offset..offset + row.len()].copy_from_slice(row);
        }
    }
    let padded_ppgs = Tensor::from_vec(ppg_buffer, (batch, channels, max_length), device)
        .map_err(|e| PpgsError::runtime("collate feature tensor", e))?;

    let mut index_buffer = vec![IGNORE_INDEX; batch * max_length];
    for (i, labels) in indices.iter().enumerate() {
        let offset = i * max_length;
        index_buffer[offset..offset + labels.len()].copy_from_slice(labels);
    }
    let padded_indices = Tensor::from_vec(index_buffer, (batch, max_length), device)
        .map_err(|e| PpgsError::runtime("collate index tensor", e))?;

    let lengths = Tensor::from_vec(
        lengths.iter().map(|&l| l as i64).collect::<Vec<i64>>(),
        (batch,),
        device,
    )
    .map_err(|e| PpgsError::runtime("collate length tensor", e))?;

    Ok((padded_ppgs, padded_indices, lengths))
}
