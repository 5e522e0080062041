//! Multi-step guided flows.
//!
//! A flow is a tagged union of the four guided interactions, each with an
//! explicit stage enum instead of stringly-typed labels.  `advance`
//! validates the input's *shape* against the current stage: a mismatch
//! yields a re-prompt instruction, never an error.  Anything that needs
//! the store (group resolution, permission checks) is deferred to the
//! engine via [`FlowAction`]; the engine mutates the flow afterwards,
//! re-validating the live stage rather than trusting a captured snapshot.

use dossier_shared::{SubjectGroupId, SubjectToken, TimeFilter};

use crate::reply::{templates, TemplateKey};

/// The active multi-step interaction of one actor.  At most one flow is
/// active per actor; starting a new flow replaces any other outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Report(ReportFlow),
    Legend(LegendFlow),
    SearchFilter(SearchFilterFlow),
    GuestPair(GuestPairFlow),
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFlow {
    pub stage: ReportStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStage {
    /// Waiting for the 10-digit subject-group id.
    AwaitGroup,
    /// Group resolved; waiting for the report text.
    AwaitText {
        group: SubjectGroupId,
        target_chat: dossier_shared::ChatId,
        target_title: String,
    },
}

// ---------------------------------------------------------------------------
// Legend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegendMode {
    Add,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendFlow {
    pub mode: LegendMode,
    pub stage: LegendStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegendStage {
    AwaitGroup,
    AwaitContent { group: SubjectGroupId },
}

// ---------------------------------------------------------------------------
// Search filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilterFlow {
    pub subject: SubjectToken,
    pub group: Option<SubjectGroupId>,
    pub time: TimeFilter,
    pub stage: SearchFilterStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilterStage {
    /// Waiting for a group id, or `-` for all groups.
    AwaitGroup,
    /// Waiting for a time-filter code (`all` / `24h`).
    AwaitTime { group: Option<SubjectGroupId> },
}

// ---------------------------------------------------------------------------
// Guest pair entry
// ---------------------------------------------------------------------------

/// The reduced guest search surface: group scope first, then subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestPairFlow {
    pub stage: GuestStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestStage {
    AwaitGroup,
    AwaitSubject { group: SubjectGroupId },
}

// ---------------------------------------------------------------------------
// Advancement
// ---------------------------------------------------------------------------

/// Result of feeding one input into the active flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    /// Input shape did not match the stage; ask again.
    Reprompt(TemplateKey),
    /// Input accepted; the engine must perform this action.
    Act(FlowAction),
}

/// Side effects requested by a flow transition.  The engine executes
/// them against the store/transport and updates the flow accordingly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    /// Resolve the group and move the report flow to `AwaitText`.
    ReportGroupChosen(SubjectGroupId),
    /// Deliver the report into the resolved chat and finish the flow.
    ReportSubmit {
        group: SubjectGroupId,
        target_chat: dossier_shared::ChatId,
        target_title: String,
        text: String,
    },
    /// Check legend preconditions and move to `AwaitContent`.
    LegendGroupChosen(LegendMode, SubjectGroupId),
    /// Write the legend document and finish the flow.
    LegendSubmit {
        mode: LegendMode,
        group: SubjectGroupId,
        content: String,
    },
    /// Continue the filter flow with the chosen group scope.
    SearchGroupChosen(Option<SubjectGroupId>),
    /// Run the filtered search from offset zero and finish the flow.
    SearchFilterReady {
        subject: SubjectToken,
        group: Option<SubjectGroupId>,
        time: TimeFilter,
    },
    /// Move the guest flow to `AwaitSubject`.
    GuestGroupChosen(SubjectGroupId),
    /// Run the guest-scoped search and finish the flow.
    GuestSearch {
        group: SubjectGroupId,
        subject: SubjectToken,
    },
}

impl Flow {
    /// Validate `input` against the current stage.
    ///
    /// Shape mismatches come back as [`FlowStep::Reprompt`]; the flow
    /// itself is left untouched either way.
    pub fn advance(&self, input: &str) -> FlowStep {
        let input = input.trim();
        match self {
            Flow::Report(report) => match &report.stage {
                ReportStage::AwaitGroup => match input.parse::<SubjectGroupId>() {
                    Ok(group) => FlowStep::Act(FlowAction::ReportGroupChosen(group)),
                    Err(_) => FlowStep::Reprompt(templates::REPORT_BAD_GROUP),
                },
                ReportStage::AwaitText {
                    group,
                    target_chat,
                    target_title,
                } => {
                    if input.is_empty() {
                        FlowStep::Reprompt(templates::REPORT_EMPTY_TEXT)
                    } else {
                        FlowStep::Act(FlowAction::ReportSubmit {
                            group: group.clone(),
                            target_chat: *target_chat,
                            target_title: target_title.clone(),
                            text: input.to_string(),
                        })
                    }
                }
            },

            Flow::Legend(legend) => match &legend.stage {
                LegendStage::AwaitGroup => match input.parse::<SubjectGroupId>() {
                    Ok(group) => FlowStep::Act(FlowAction::LegendGroupChosen(legend.mode, group)),
                    Err(_) => FlowStep::Reprompt(templates::LEGEND_BAD_GROUP),
                },
                LegendStage::AwaitContent { group } => {
                    if input.is_empty() {
                        FlowStep::Reprompt(templates::LEGEND_EMPTY_CONTENT)
                    } else {
                        FlowStep::Act(FlowAction::LegendSubmit {
                            mode: legend.mode,
                            group: group.clone(),
                            content: input.to_string(),
                        })
                    }
                }
            },

            Flow::SearchFilter(filter) => match &filter.stage {
                SearchFilterStage::AwaitGroup => {
                    if input == "-" {
                        FlowStep::Act(FlowAction::SearchGroupChosen(None))
                    } else {
                        match input.parse::<SubjectGroupId>() {
                            Ok(group) => FlowStep::Act(FlowAction::SearchGroupChosen(Some(group))),
                            Err(_) => FlowStep::Reprompt(templates::SEARCH_FILTER_BAD_GROUP),
                        }
                    }
                }
                SearchFilterStage::AwaitTime { group } => match TimeFilter::from_code(input) {
                    Some(time) => FlowStep::Act(FlowAction::SearchFilterReady {
                        subject: filter.subject.clone(),
                        group: group.clone(),
                        time,
                    }),
                    None => FlowStep::Reprompt(templates::SEARCH_FILTER_BAD_TIME),
                },
            },

            Flow::GuestPair(guest) => match &guest.stage {
                GuestStage::AwaitGroup => match input.parse::<SubjectGroupId>() {
                    Ok(group) => FlowStep::Act(FlowAction::GuestGroupChosen(group)),
                    Err(_) => FlowStep::Reprompt(templates::GUEST_BAD_GROUP),
                },
                GuestStage::AwaitSubject { group } => match input.parse::<SubjectToken>() {
                    Ok(subject) => FlowStep::Act(FlowAction::GuestSearch {
                        group: group.clone(),
                        subject,
                    }),
                    Err(_) => FlowStep::Reprompt(templates::GUEST_BAD_SUBJECT),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_flow_validates_shape_per_stage() {
        let flow = Flow::Report(ReportFlow {
            stage: ReportStage::AwaitGroup,
        });
        assert_eq!(
            flow.advance("not digits"),
            FlowStep::Reprompt(templates::REPORT_BAD_GROUP)
        );
        assert!(matches!(
            flow.advance("5550001234"),
            FlowStep::Act(FlowAction::ReportGroupChosen(_))
        ));

        let flow = Flow::Report(ReportFlow {
            stage: ReportStage::AwaitText {
                group: "5550001234".parse().unwrap(),
                target_chat: dossier_shared::ChatId(100),
                target_title: "g".into(),
            },
        });
        assert_eq!(
            flow.advance("   "),
            FlowStep::Reprompt(templates::REPORT_EMPTY_TEXT)
        );
        assert!(matches!(
            flow.advance("report text"),
            FlowStep::Act(FlowAction::ReportSubmit { .. })
        ));
    }

    #[test]
    fn search_filter_accepts_dash_and_time_codes() {
        let flow = Flow::SearchFilter(SearchFilterFlow {
            subject: "1234567890".parse().unwrap(),
            group: None,
            time: TimeFilter::All,
            stage: SearchFilterStage::AwaitGroup,
        });
        assert!(matches!(
            flow.advance("-"),
            FlowStep::Act(FlowAction::SearchGroupChosen(None))
        ));

        let flow = Flow::SearchFilter(SearchFilterFlow {
            subject: "1234567890".parse().unwrap(),
            group: None,
            time: TimeFilter::All,
            stage: SearchFilterStage::AwaitTime { group: None },
        });
        assert_eq!(
            flow.advance("weekly"),
            FlowStep::Reprompt(templates::SEARCH_FILTER_BAD_TIME)
        );
        assert!(matches!(
            flow.advance("24h"),
            FlowStep::Act(FlowAction::SearchFilterReady {
                time: TimeFilter::Last24h,
                ..
            })
        ));
    }

    #[test]
    fn guest_pair_requires_ten_digit_fields() {
        let flow = Flow::GuestPair(GuestPairFlow {
            stage: GuestStage::AwaitGroup,
        });
        assert_eq!(
            flow.advance("12345"),
            FlowStep::Reprompt(templates::GUEST_BAD_GROUP)
        );

        let flow = Flow::GuestPair(GuestPairFlow {
            stage: GuestStage::AwaitSubject {
                group: "1234567890".parse().unwrap(),
            },
        });
        assert!(matches!(
            flow.advance("9999999999"),
            FlowStep::Act(FlowAction::GuestSearch { .. })
        ));
    }
}
