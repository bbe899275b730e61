//! Application state coordinator.
//!
//! `DesignStudio` owns the image lineage, the transcript and the active
//! conversation, and runs the style and chat flows against them. Methods take
//! `&self` so a front end can drive a style render on one thread while the chat
//! loop keeps running on another. Each operation class has its own busy flag;
//! a trigger that finds its flag set is dropped, not queued. Network calls are
//! made without holding the state lock, and every completion checks the project
//! epoch so results that land after a reset are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use lumina_contracts::chat::{classify_response, TurnOutcome};
use lumina_contracts::errors::{DesignError, DesignResult};
use lumina_contracts::events::{EventKind, EventWriter};
use lumina_contracts::images::{ImageLineage, ImagePayload};
use lumina_contracts::styles::StyleDescriptor;
use lumina_contracts::transcript::{ChatTurn, Transcript};
use serde_json::{json, Value};

use crate::adapters::{ImageEditAdapter, ImageGenerationAdapter};
use crate::backend::ModelBackend;
use crate::session::{ConversationSession, EditReport, SessionManager};

pub const APPLYING_CHANGES_TEXT: &str = "Applying your changes...";
pub const EDIT_FAILED_TEXT: &str =
    "I tried to edit the image but encountered an error. Please try a different instruction.";
pub const EDIT_BUSY_TEXT: &str =
    "I'm still rendering your last design. Please send that change again once it's done.";

pub fn style_applied_text(style_name: &str) -> String {
    format!(
        "I've reimagined your room in the {style_name} style. How do you like it? You can ask me to change specific details or find items to buy."
    )
}

pub fn edit_applied_text(instruction: &str) -> String {
    format!("I've updated the design to: \"{instruction}\". Let me know if you want more changes!")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudioPhase {
    Upload,
    Editing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StyleOutcome {
    Applied {
        style_id: String,
        image: ImagePayload,
        turn: ChatTurn,
    },
    /// A render was already in flight; no backend call was made.
    Suppressed,
    NotReady,
    /// The project was reset while the render was running.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    Answered {
        turn: ChatTurn,
    },
    Edited {
        instruction: String,
        image: ImagePayload,
        turn: ChatTurn,
    },
    EditFailed {
        instruction: String,
        error: DesignError,
        turn: ChatTurn,
    },
    /// The assistant asked for an edit while a style render held the image
    /// flag; nothing was sent to the image model.
    EditSkipped {
        instruction: String,
        turn: ChatTurn,
    },
    /// Another chat turn was in flight.
    Suppressed,
    Ignored,
    NotReady,
    Discarded,
}

struct StudioState {
    epoch: u64,
    lineage: Option<ImageLineage>,
    transcript: Transcript,
    selected_style: Option<String>,
}

impl StudioState {
    fn fresh(epoch: u64) -> Self {
        Self {
            epoch,
            lineage: None,
            transcript: Transcript::new(),
            selected_style: None,
        }
    }

    fn most_recent_image(&self) -> Option<ImagePayload> {
        self.lineage
            .as_ref()
            .map(|lineage| lineage.most_recent().payload.clone())
    }
}

/// The conversation of the project opened under `epoch`.
struct SessionSlot {
    epoch: u64,
    conversation: ConversationSession,
}

/// Set while held; cleared on drop.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DesignStudio {
    generator: ImageGenerationAdapter,
    editor: ImageEditAdapter,
    sessions: SessionManager,
    state: Mutex<StudioState>,
    session: Mutex<SessionSlot>,
    rendering: AtomicBool,
    chatting: AtomicBool,
    events: Option<EventWriter>,
}

impl DesignStudio {
    pub fn new(
        generator: ImageGenerationAdapter,
        editor: ImageEditAdapter,
        sessions: SessionManager,
    ) -> Self {
        let conversation = sessions.create_session();
        Self {
            generator,
            editor,
            sessions,
            state: Mutex::new(StudioState::fresh(0)),
            session: Mutex::new(SessionSlot {
                epoch: 0,
                conversation,
            }),
            rendering: AtomicBool::new(false),
            chatting: AtomicBool::new(false),
            events: None,
        }
    }

    /// Wires all three collaborators to one backend.
    pub fn from_backend(backend: Arc<dyn ModelBackend>) -> Self {
        Self::new(
            ImageGenerationAdapter::new(backend.clone()),
            ImageEditAdapter::new(backend.clone()),
            SessionManager::new(backend),
        )
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn phase(&self) -> StudioPhase {
        if self.state().lineage.is_some() {
            StudioPhase::Editing
        } else {
            StudioPhase::Upload
        }
    }

    pub fn original_image(&self) -> Option<ImagePayload> {
        self.state()
            .lineage
            .as_ref()
            .map(|lineage| lineage.original().clone())
    }

    pub fn current_image(&self) -> Option<ImagePayload> {
        self.state()
            .lineage
            .as_ref()
            .and_then(|lineage| lineage.current().cloned())
    }

    /// Whichever image is newest: `current` when set, else `original`.
    pub fn display_image(&self) -> Option<ImagePayload> {
        self.state().most_recent_image()
    }

    pub fn transcript(&self) -> Transcript {
        self.state().transcript.clone()
    }

    pub fn selected_style(&self) -> Option<String> {
        self.state().selected_style.clone()
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::Acquire)
    }

    pub fn is_chatting(&self) -> bool {
        self.chatting.load(Ordering::Acquire)
    }

    /// Upload -> Editing. Starts a new lineage, an empty transcript and a
    /// fresh conversation.
    pub fn open_project(&self, original: ImagePayload) -> DesignResult<()> {
        let epoch = {
            let mut state = self.state();
            if state.lineage.is_some() {
                return Err(DesignError::InvalidState(
                    "a project is already open; reset it first".to_string(),
                ));
            }
            let epoch = state.epoch + 1;
            *state = StudioState::fresh(epoch);
            state.lineage = Some(ImageLineage::new(original.clone()));
            epoch
        };
        let session_id = self.replace_session(epoch);
        tracing::info!(
            image = %original.fingerprint(),
            session_id = ?session_id,
            "project opened"
        );
        self.emit(
            EventKind::ProjectOpened,
            json!({
                "image": original.fingerprint(),
                "mime": original.mime.as_mime(),
                "conversation_id": session_id,
            }),
        );
        Ok(())
    }

    /// Editing -> Upload. Drops lineage, transcript and conversation and opens a
    /// fresh conversation for the next project.
    ///
    /// Never waits on an in-flight chat turn: that turn sees the new epoch and
    /// discards its result.
    pub fn reset(&self) {
        let epoch = {
            let mut state = self.state();
            let epoch = state.epoch + 1;
            *state = StudioState::fresh(epoch);
            epoch
        };
        let session_id = self.replace_session(epoch);
        tracing::info!(session_id = ?session_id, "project reset");
        self.emit(
            EventKind::ProjectReset,
            json!({ "conversation_id": session_id }),
        );
    }

    /// Renders the newest image in `style`. On failure nothing changes and the
    /// error is returned for the caller to surface.
    pub fn select_style(&self, style: &StyleDescriptor) -> DesignResult<StyleOutcome> {
        let Some(_busy) = BusyGuard::acquire(&self.rendering) else {
            tracing::debug!(style = %style.id, "style selection ignored; render in flight");
            return Ok(StyleOutcome::Suppressed);
        };

        let (epoch, source) = {
            let state = self.state();
            let Some(source) = state.most_recent_image() else {
                return Ok(StyleOutcome::NotReady);
            };
            (state.epoch, source)
        };

        let image = match self.generator.generate(&source, &style.prompt) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(style = %style.id, error = %err, "style render failed");
                self.emit(
                    EventKind::StyleFailed,
                    json!({ "style_id": style.id, "error": err.to_string() }),
                );
                return Err(err);
            }
        };

        let turn = {
            let mut state = self.state();
            if state.epoch != epoch {
                return Ok(StyleOutcome::Discarded);
            }
            let Some(lineage) = state.lineage.as_mut() else {
                return Ok(StyleOutcome::Discarded);
            };
            lineage.replace_current(image.clone());
            state.selected_style = Some(style.id.clone());
            state
                .transcript
                .push(ChatTurn::assistant(style_applied_text(&style.name)))
                .clone()
        };

        tracing::info!(style = %style.id, image = %image.fingerprint(), "style applied");
        self.emit(
            EventKind::StyleApplied,
            json!({
                "style_id": style.id,
                "source": source.fingerprint(),
                "image": image.fingerprint(),
            }),
        );
        Ok(StyleOutcome::Applied {
            style_id: style.id.clone(),
            image,
            turn,
        })
    }

    /// One chat turn: session call, classification, then either an answer in
    /// the transcript or an image edit bracketed by a placeholder turn. The two
    /// backend calls run strictly one after the other.
    pub fn send_chat(&self, text: &str) -> ChatOutcome {
        let text = text.trim();
        if text.is_empty() {
            return ChatOutcome::Ignored;
        }
        let Some(_busy) = BusyGuard::acquire(&self.chatting) else {
            tracing::debug!("chat message ignored; previous turn in flight");
            return ChatOutcome::Suppressed;
        };

        let (epoch, context) = {
            let mut state = self.state();
            let Some(context) = state.most_recent_image() else {
                return ChatOutcome::NotReady;
            };
            state.transcript.push(ChatTurn::user(text));
            (state.epoch, context)
        };
        self.emit(EventKind::ChatUserTurn, json!({ "text": text }));

        let Some(mut slot) = self.session_for(epoch) else {
            return ChatOutcome::Discarded;
        };
        let reply = self
            .sessions
            .send_turn(&mut slot.conversation, text, Some(&context));

        match classify_response(&reply) {
            TurnOutcome::Answer(answer) => {
                let mut state = self.state();
                if state.epoch != epoch {
                    return ChatOutcome::Discarded;
                }
                let citations = answer.citations.len();
                let turn = state
                    .transcript
                    .push(ChatTurn::assistant(answer.text).with_citations(answer.citations))
                    .clone();
                drop(state);
                self.emit(EventKind::ChatAnswer, json!({ "citations": citations }));
                ChatOutcome::Answered { turn }
            }
            TurnOutcome::EditIntent { prompt } => {
                self.apply_chat_edit(&mut slot.conversation, epoch, prompt)
            }
        }
    }

    fn apply_chat_edit(
        &self,
        session: &mut ConversationSession,
        epoch: u64,
        instruction: String,
    ) -> ChatOutcome {
        // Claim the image flag before reading the source so a style render
        // cannot commit in between.
        let busy = BusyGuard::acquire(&self.rendering);
        let (placeholder, source) = {
            let mut state = self.state();
            if state.epoch != epoch {
                return ChatOutcome::Discarded;
            }
            let Some(source) = state.most_recent_image() else {
                return ChatOutcome::Discarded;
            };
            (state.transcript.push_placeholder(APPLYING_CHANGES_TEXT), source)
        };

        let Some(busy) = busy else {
            session.report_edit(EditReport::Skipped);
            let turn = ChatTurn::assistant_error(EDIT_BUSY_TEXT);
            let mut state = self.state();
            if state.epoch != epoch {
                return ChatOutcome::Discarded;
            }
            state.transcript.resolve_placeholder(placeholder, turn.clone());
            return ChatOutcome::EditSkipped { instruction, turn };
        };
        let result = self.editor.edit(&source, &instruction);
        drop(busy);

        session.report_edit(if result.is_ok() {
            EditReport::Applied
        } else {
            EditReport::Failed
        });

        let mut state = self.state();
        if state.epoch != epoch {
            return ChatOutcome::Discarded;
        }
        match result {
            Ok(image) => {
                if let Some(lineage) = state.lineage.as_mut() {
                    lineage.replace_current(image.clone());
                }
                let turn = ChatTurn::assistant(edit_applied_text(&instruction));
                state.transcript.resolve_placeholder(placeholder, turn.clone());
                drop(state);
                tracing::info!(image = %image.fingerprint(), "edit applied");
                self.emit(
                    EventKind::EditApplied,
                    json!({
                        "instruction": instruction,
                        "source": source.fingerprint(),
                        "image": image.fingerprint(),
                    }),
                );
                ChatOutcome::Edited {
                    instruction,
                    image,
                    turn,
                }
            }
            Err(error) => {
                let turn = ChatTurn::assistant_error(EDIT_FAILED_TEXT);
                state.transcript.resolve_placeholder(placeholder, turn.clone());
                drop(state);
                tracing::warn!(error = %error, "edit failed; keeping current image");
                self.emit(
                    EventKind::EditFailed,
                    json!({ "instruction": instruction, "error": error.to_string() }),
                );
                ChatOutcome::EditFailed {
                    instruction,
                    error,
                    turn,
                }
            }
        }
    }

    /// Installs a fresh conversation for `epoch`. Returns `None` when a chat
    /// turn holds the slot; `session_for` replaces it on the next turn.
    fn replace_session(&self, epoch: u64) -> Option<String> {
        let mut slot = match self.session.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        slot.conversation = self.sessions.create_session();
        slot.epoch = epoch;
        Some(slot.conversation.id().to_string())
    }

    /// Locks the conversation for a turn started under `epoch`. `None` means
    /// the project was replaced while the turn waited for the lock.
    fn session_for(&self, epoch: u64) -> Option<MutexGuard<'_, SessionSlot>> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.epoch > epoch {
            return None;
        }
        if slot.epoch < epoch {
            slot.conversation = self.sessions.create_session();
            slot.epoch = epoch;
        }
        Some(slot)
    }

    fn state(&self) -> MutexGuard<'_, StudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, kind: EventKind, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit_json(kind, payload) {
            tracing::warn!(event = kind.as_str(), error = %err, "failed to write event");
        }
    }
}
