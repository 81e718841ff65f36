//! The coaching experts and the order they run in

use stride_agent::{AgentRole, ExpertNodeConfig};

/// Knobs applied to the whole roster
#[derive(Debug, Clone, Copy)]
pub struct RosterOptions {
    pub plotting: bool,
    pub hitl: bool,
    pub max_iterations: u32,
    pub max_plots: u32,
    /// Add the season and weekly planners after the analysts
    pub planning: bool,
}

const ANALYSTS: [(&str, &str, AgentRole, &str, &str); 3] = [
    (
        "metrics",
        "Metrics Expert",
        AgentRole::Metrics,
        "You are a sports scientist who reads training metrics the way others read maps. \
         You model training load, fitness and fatigue over time and spot plateaus, \
         breakthrough windows and overtraining risk before they are obvious.",
        "analyzing training load history and fitness progression",
    ),
    (
        "activity",
        "Activity Expert",
        AgentRole::Activity,
        "You are an endurance coach who has reviewed thousands of workouts. You judge \
         how sessions were executed, how pacing and intensity were distributed and how \
         the athlete's workouts progress from week to week.",
        "interpreting workout execution and training progression",
    ),
    (
        "physiology",
        "Physiology Expert",
        AgentRole::Physiology,
        "You are an exercise physiologist focused on recovery. You read heart rate \
         variability, sleep, stress and resting heart rate to judge how well the \
         athlete absorbs training.",
        "analyzing recovery status and physiological adaptation",
    ),
];

const ANALYST_TEMPLATE: &str = "Analyze the {topic} data for athlete {athlete_name}.

This analysis goes to other coaching experts, not to the athlete. Refer to \"the athlete\".

## Data
{data}

## Current Date
{current_date}

## Context From The Athlete
{analysis_context}

## Your Task
1. Identify the significant trends and patterns
2. Relate them to the athlete's goals and upcoming events
3. Flag risks and opportunities
4. Give concrete, evidence-based recommendations

Format the result as structured markdown. Do not speculate about data you do not have.";

const SYNTHESIS_SYSTEM: &str = "You are a performance integration specialist. You combine \
    metrics, workout execution and physiology into one coherent picture and turn it into \
    clear, actionable advice.";

const SYNTHESIS_TEMPLATE: &str = "Synthesize the expert analyses below into one report for {athlete_name}.

This report is shown directly to the athlete.

## Metrics Analysis
{metrics_result}

## Activity Analysis
{activity_result}

## Physiology Analysis
{physiology_result}

## Current Date
{current_date}

## Your Task
1. Start with a short executive summary
2. Connect training load with physiological response
3. Highlight the few findings that matter most
4. Finish with brief, actionable recommendations

Keep every [PLOT:plot_id] reference from the analyses you want to show, each exactly once.";

const SEASON_PLANNER_SYSTEM: &str = "You are a periodization coach with decades of experience \
    preparing endurance athletes for their key races. You think in training phases, balance \
    stress against recovery over months and time peaks to the competition calendar.";

const SEASON_PLANNER_TEMPLATE: &str = "Create a high-level season plan covering the next 12-24 weeks for {athlete_name}.

This plan goes to the weekly planner, not to the athlete. Keep it concise.

## Current Date
{current_date}

## Upcoming Competitions
{competitions}

## Instructions From The Athlete
{planning_context}

## Previous Season Plan
{previous_season_plan}

## Your Task
1. Plan overview: how the season is structured and progresses
2. Training phases with approximate date ranges
3. For each phase: primary focus, approximate weekly volume, intensity distribution and key workout types

Format the result as structured markdown.";

const WEEKLY_PLANNER_SYSTEM: &str = "You are a hands-on endurance coach who turns long-term \
    plans into concrete workouts. Every session you prescribe has a purpose, a clear structure \
    and an easier option for days when the athlete is not ready.";

const WEEKLY_PLANNER_TEMPLATE: &str = "Create a detailed 14-day training plan for {athlete_name}.

This plan is shown directly to the athlete.

## Season Plan
{season_plan}

## Current Date
{current_date}

## Upcoming Two Weeks
{week_dates}

## Upcoming Competitions
{competitions}

## Instructions From The Athlete
{planning_context}

## Metrics Analysis
{metrics_result}

## Activity Analysis
{activity_result}

## Physiology Analysis
{physiology_result}

## Your Task
Start with the athlete's training zones, derived from whatever thresholds the analyses report. \
Then, for each day, give the date, workout type, purpose, structure with intensities and \
durations, and how to adapt it to the day's readiness. Align the block with the current \
phase of the season plan.";

fn workflow_context(responsibility: &str, planning: bool) -> String {
    let planners = if planning {
        " Alongside it a season planner outlines the coming months, and a weekly planner \
         then turns that outline and the analyses into the next two weeks of workouts."
    } else {
        ""
    };
    format!(
        "\n\n## Workflow\n\
         You are one expert in a coaching workflow. The metrics, activity and physiology \
         experts analyze in parallel; a synthesis expert then combines their reports.\
         {planners} Your responsibility is {responsibility}."
    )
}

fn plotting_instructions(max_plots: u32) -> String {
    format!(
        "\n\n## Visualizations\n\
         Create at most {max_plots} plots with python_plotting_tool, and only for insights \
         a standard training app does not already show. Each successful call returns a \
         reference like [PLOT:plot_id]. Put each reference in your text exactly once, where \
         it best supports the finding. Use list_available_plots to see plots from other experts."
    )
}

const HITL_INSTRUCTIONS: &str = "\n\n## Talking To The Athlete\n\
    You may use communicate_with_human once, only when an answer would materially change \
    your analysis. Ask one specific question. Otherwise proceed with the data you have.";

const NO_HITL_INSTRUCTIONS: &str = "\n\n## Talking To The Athlete\n\
    The athlete is not available during this analysis. Do not use communicate_with_human.";

fn system_prompt(persona: &str, responsibility: &str, options: &RosterOptions) -> String {
    let mut prompt = format!(
        "{persona}{}",
        workflow_context(responsibility, options.planning)
    );
    if options.plotting {
        prompt.push_str(&plotting_instructions(options.max_plots));
    }
    prompt.push_str(if options.hitl {
        HITL_INSTRUCTIONS
    } else {
        NO_HITL_INSTRUCTIONS
    });
    prompt
}

fn finish(config: ExpertNodeConfig, options: &RosterOptions) -> ExpertNodeConfig {
    config
        .with_plotting(options.plotting)
        .with_max_iterations(options.max_iterations)
        .with_max_human_interactions(if options.hitl { 1 } else { 0 })
}

/// Planners never plot
fn planner(
    (node, display, role): (&str, &str, AgentRole),
    persona: &str,
    responsibility: &str,
    options: &RosterOptions,
) -> ExpertNodeConfig {
    let options = RosterOptions {
        plotting: false,
        ..*options
    };
    let config = ExpertNodeConfig::new(node, display, role)
        .with_system_prompt(system_prompt(persona, responsibility, &options));
    finish(config, &options)
}

/// Stage one runs the analysts side by side; stage two synthesizes their
/// results. With planning, the season planner joins stage two and the weekly
/// planner runs last.
pub fn roster(options: RosterOptions) -> Vec<Vec<ExpertNodeConfig>> {
    let analysts = ANALYSTS
        .iter()
        .map(|(node, display, role, persona, responsibility)| {
            let config = ExpertNodeConfig::new(*node, *display, *role)
                .with_system_prompt(system_prompt(persona, responsibility, &options))
                .with_user_prompt_template(ANALYST_TEMPLATE.replace("{topic}", node));
            finish(config, &options)
        })
        .collect();

    let synthesis = ExpertNodeConfig::new("synthesis", "Synthesis Expert", AgentRole::Synthesis)
        .with_system_prompt(system_prompt(
            SYNTHESIS_SYSTEM,
            "combining the analysts' reports into the final report",
            &options,
        ))
        .with_user_prompt_template(SYNTHESIS_TEMPLATE);

    let mut stages = vec![analysts, vec![finish(synthesis, &options)]];
    if options.planning {
        let season = planner(
            ("season_planner", "Season Planner", AgentRole::SeasonPlanner),
            SEASON_PLANNER_SYSTEM,
            "the long-term season plan",
            &options,
        )
        .with_user_prompt_template(SEASON_PLANNER_TEMPLATE)
        .with_result_key("season_plan");
        let weekly = planner(
            ("weekly_planner", "Weekly Planner", AgentRole::WeeklyPlanner),
            WEEKLY_PLANNER_SYSTEM,
            "the detailed plan for the next 14 days",
            &options,
        )
        .with_user_prompt_template(WEEKLY_PLANNER_TEMPLATE)
        .with_result_key("weekly_plan");
        stages[1].push(season);
        stages.push(vec![weekly]);
    }
    stages
}
