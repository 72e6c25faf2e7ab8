mod handler;
mod model;

pub use handler::{
    create_plan, create_task, delete_plan, delete_task, get_plan, list_plans, progress_history,
    progress_stats, record_progress, update_plan, update_task,
};
