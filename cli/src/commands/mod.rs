mod calendar;
mod entry;
mod goal;
mod helpers;
mod message;
mod sync;

pub(crate) use calendar::cmd_calendar;
pub(crate) use entry::{cmd_delete, cmd_history, cmd_log, cmd_show};
pub(crate) use goal::{cmd_goal_set, cmd_goal_show};
pub(crate) use message::{
    cmd_message_add, cmd_message_delete, cmd_message_edit, cmd_message_list, cmd_message_random,
};
pub(crate) use sync::cmd_sync;
