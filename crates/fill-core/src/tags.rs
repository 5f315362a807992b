/// Names shared between metrics and the audit trail for one process value.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const SCALE_WEIGHT_KG: Tag = Tag {
    key: "weight_kg",
    metric: "batchfill_scale_weight_kg",
};

pub const STAGE_DELTA_KG: Tag = Tag {
    key: "stage_delta_kg",
    metric: "batchfill_stage_delta_kg",
};

pub const STAGE_TARGET_KG: Tag = Tag {
    key: "stage_target_kg",
    metric: "batchfill_stage_target_kg",
};

pub const STAGE_PHASE: Tag = Tag {
    key: "stage_phase",
    metric: "batchfill_stage_phase",
};

pub const BATCH_TOTAL_KG: Tag = Tag {
    key: "total_kg",
    metric: "batchfill_batch_total_kg",
};

pub const SAMPLES: Tag = Tag {
    key: "samples",
    metric: "batchfill_scale_samples_total",
};

pub const STAGES_COMPLETED: Tag = Tag {
    key: "stages_completed",
    metric: "batchfill_stages_completed_total",
};

pub const BATCH_ABORTS: Tag = Tag {
    key: "abort_kind",
    metric: "batchfill_batch_aborts_total",
};

pub const FLOW_WARNINGS: Tag = Tag {
    key: "flow_warning",
    metric: "batchfill_flow_warnings_total",
};
