//! The table-driven finite-state machine behind the query parser.
//!
//! Eleven states: the common state plus five for each bracket flavour of
//! range query. The transition table maps `(state, lexeme type)` to a target
//! state with input actions; entry actions fire on entering a state. A
//! missing transition is a syntax error at the offending lexeme's position.
//!
//! Actions are plain identifiers; the parser owns all mutable state and
//! dispatches on them in one place.

use ahash::AHashMap;

use crate::error::{LucernaError, Result};
use crate::query::lexer::{Lexeme, LexemeKind};

/// FSM states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Everything outside a range query.
    Common,
    /// `[` seen.
    ClosedRqStart,
    /// `[lower` seen.
    ClosedRqFirstTerm,
    /// `[lower TO` seen.
    ClosedRqToTerm,
    /// `[lower TO upper` seen.
    ClosedRqLastTerm,
    /// `[lower TO upper]` complete.
    ClosedRqEnd,
    /// `{` seen.
    OpenedRqStart,
    /// `{lower` seen.
    OpenedRqFirstTerm,
    /// `{lower TO` seen.
    OpenedRqToTerm,
    /// `{lower TO upper` seen.
    OpenedRqLastTerm,
    /// `{lower TO upper}` complete.
    OpenedRqEnd,
}

/// Parser actions, dispatched by the parser's single handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Add a term entry to the current context.
    AddTermEntry,
    /// Add a phrase entry to the current context.
    AddPhraseEntry,
    /// Record a field qualifier for the next entry.
    SetField,
    /// Record a `+` sign for the next entry.
    SetSignRequired,
    /// Record a `-` sign for the next entry.
    SetSignProhibited,
    /// Apply `~` to the previous entry.
    ProcessFuzzyProximityModifier,
    /// Note a pending `^`; the following number must complete it.
    ProcessBoostingModifier,
    /// Consume the number following `~` or `^`.
    ProcessModifierParameter,
    /// Open a subquery context.
    SubqueryStart,
    /// Close the current subquery context.
    SubqueryEnd,
    /// Record `AND`/`OR`/`NOT`.
    LogicalOperator,
    /// Stash the first range boundary (entry action).
    RangeFirstTerm,
    /// Stash the second range boundary (entry action).
    RangeLastTerm,
    /// Build an inclusive range entry (entry action).
    ClosedRangeEnd,
    /// Build an exclusive range entry (entry action).
    OpenedRangeEnd,
}

struct Transition {
    next: State,
    input_action: Option<Action>,
}

/// The transition table plus current state.
pub struct Fsm {
    state: State,
    transitions: AHashMap<(State, LexemeKind), Transition>,
    entry_actions: AHashMap<State, Action>,
}

impl Fsm {
    /// Build the table and start in the common state.
    pub fn new() -> Self {
        let mut transitions = AHashMap::new();
        let mut add = |state: State, kind: LexemeKind, next: State, action: Option<Action>| {
            transitions.insert(
                (state, kind),
                Transition {
                    next,
                    input_action: action,
                },
            );
        };

        // The two range-end states accept everything the common state does.
        let common_like = [State::Common, State::ClosedRqEnd, State::OpenedRqEnd];
        for source in common_like {
            add(source, LexemeKind::Word, State::Common, Some(Action::AddTermEntry));
            add(source, LexemeKind::Phrase, State::Common, Some(Action::AddPhraseEntry));
            add(source, LexemeKind::Field, State::Common, Some(Action::SetField));
            add(source, LexemeKind::Required, State::Common, Some(Action::SetSignRequired));
            add(
                source,
                LexemeKind::Prohibited,
                State::Common,
                Some(Action::SetSignProhibited),
            );
            add(
                source,
                LexemeKind::FuzzyProx,
                State::Common,
                Some(Action::ProcessFuzzyProximityModifier),
            );
            add(
                source,
                LexemeKind::Boosting,
                State::Common,
                Some(Action::ProcessBoostingModifier),
            );
            add(
                source,
                LexemeKind::Number,
                State::Common,
                Some(Action::ProcessModifierParameter),
            );
            add(
                source,
                LexemeKind::SubqueryStart,
                State::Common,
                Some(Action::SubqueryStart),
            );
            add(
                source,
                LexemeKind::SubqueryEnd,
                State::Common,
                Some(Action::SubqueryEnd),
            );
            for kind in [LexemeKind::And, LexemeKind::Or, LexemeKind::Not] {
                add(source, kind, State::Common, Some(Action::LogicalOperator));
            }
            add(source, LexemeKind::RangeInclStart, State::ClosedRqStart, None);
            add(source, LexemeKind::RangeExclStart, State::OpenedRqStart, None);
        }

        // Range sub-machines accept exactly `WORD TO WORD` then the matching
        // closing bracket.
        add(State::ClosedRqStart, LexemeKind::Word, State::ClosedRqFirstTerm, None);
        add(State::ClosedRqFirstTerm, LexemeKind::To, State::ClosedRqToTerm, None);
        add(State::ClosedRqToTerm, LexemeKind::Word, State::ClosedRqLastTerm, None);
        add(
            State::ClosedRqLastTerm,
            LexemeKind::RangeInclEnd,
            State::ClosedRqEnd,
            None,
        );
        add(State::OpenedRqStart, LexemeKind::Word, State::OpenedRqFirstTerm, None);
        add(State::OpenedRqFirstTerm, LexemeKind::To, State::OpenedRqToTerm, None);
        add(State::OpenedRqToTerm, LexemeKind::Word, State::OpenedRqLastTerm, None);
        add(
            State::OpenedRqLastTerm,
            LexemeKind::RangeExclEnd,
            State::OpenedRqEnd,
            None,
        );

        let mut entry_actions = AHashMap::new();
        entry_actions.insert(State::ClosedRqFirstTerm, Action::RangeFirstTerm);
        entry_actions.insert(State::ClosedRqLastTerm, Action::RangeLastTerm);
        entry_actions.insert(State::ClosedRqEnd, Action::ClosedRangeEnd);
        entry_actions.insert(State::OpenedRqFirstTerm, Action::RangeFirstTerm);
        entry_actions.insert(State::OpenedRqLastTerm, Action::RangeLastTerm);
        entry_actions.insert(State::OpenedRqEnd, Action::OpenedRangeEnd);

        Fsm {
            state: State::Common,
            transitions,
            entry_actions,
        }
    }

    /// The current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the machine is in a state a query may end in.
    pub fn is_final(&self) -> bool {
        matches!(
            self.state,
            State::Common | State::ClosedRqEnd | State::OpenedRqEnd
        )
    }

    /// Consume one lexeme, returning the actions to run in order.
    ///
    /// A lexeme without a transition from the current state is a syntax
    /// error at its character position.
    pub fn advance(&mut self, lexeme: &Lexeme) -> Result<Vec<Action>> {
        let Some(transition) = self.transitions.get(&(self.state, lexeme.kind)) else {
            return Err(LucernaError::syntax_error(lexeme.position));
        };

        let mut actions = Vec::with_capacity(2);
        if let Some(action) = transition.input_action {
            actions.push(action);
        }
        if let Some(&action) = self.entry_actions.get(&transition.next) {
            actions.push(action);
        }
        self.state = transition.next;
        Ok(actions)
    }
}

impl Default for Fsm {
    fn default() -> Self {
        Self::new()
    }
}
