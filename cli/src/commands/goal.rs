use anyhow::Result;
use serde::Serialize;

use calgrid_core::service::CalgridService;

#[derive(Serialize)]
struct GoalJson {
    goal: i64,
}

pub(crate) fn cmd_goal_set(svc: &CalgridService, calories: i64, json: bool) -> Result<()> {
    let goal = svc.set_goal(calories)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&GoalJson { goal })?);
    } else {
        println!("Daily goal set to {goal} kcal");
    }
    Ok(())
}

pub(crate) fn cmd_goal_show(svc: &CalgridService, json: bool) -> Result<()> {
    let goal = svc.goal()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&GoalJson { goal })?);
    } else {
        println!("Daily goal: {goal} kcal");
    }
    Ok(())
}
