use opencv::core::{Point, Rect};

/// Выделение со стороной не больше этого значения отбрасывается
pub const MIN_SELECTION_SIZE: i32 = 20;

/// События мыши над замороженным кадром
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouseInput {
    Press(Point),
    Move(Point),
    Release(Point),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SelectionState {
    #[default]
    WaitingForStart,
    Dragging {
        anchor: Point,
        cursor: Point,
    },
    Complete(Rect),
}

/// Что нужно сделать интерфейсу после очередного события
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionUpdate {
    Idle,
    /// Перерисовать рамку во время перетаскивания
    Preview(Rect),
    Selected(Rect),
    /// Область слишком маленькая, выделение сброшено
    TooSmall(Rect),
}

/// Сессия выделения ROI. Передаётся по значению и возвращается обратно.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SelectionSession {
    state: SelectionState,
}

impl SelectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn selected(&self) -> Option<Rect> {
        match self.state {
            SelectionState::Complete(rect) => Some(rect),
            _ => None,
        }
    }

    pub fn advance(self, input: MouseInput) -> (Self, SelectionUpdate) {
        use SelectionState::*;

        match (self.state, input) {
            // Новое нажатие всегда начинает новое выделение, в том числе после завершённого
            (_, MouseInput::Press(p)) => (
                Self::with_state(Dragging {
                    anchor: p,
                    cursor: p,
                }),
                SelectionUpdate::Preview(bounding_rect(p, p)),
            ),
            (Dragging { anchor, .. }, MouseInput::Move(p)) => (
                Self::with_state(Dragging { anchor, cursor: p }),
                SelectionUpdate::Preview(bounding_rect(anchor, p)),
            ),
            (Dragging { anchor, .. }, MouseInput::Release(p)) => {
                let rect = bounding_rect(anchor, p);
                if is_large_enough(rect) {
                    (Self::with_state(Complete(rect)), SelectionUpdate::Selected(rect))
                } else {
                    (Self::with_state(WaitingForStart), SelectionUpdate::TooSmall(rect))
                }
            }
            (state, _) => (Self::with_state(state), SelectionUpdate::Idle),
        }
    }

    fn with_state(state: SelectionState) -> Self {
        Self { state }
    }
}

pub fn bounding_rect(a: Point, b: Point) -> Rect {
    Rect::new(a.x.min(b.x), a.y.min(b.y), (a.x - b.x).abs(), (a.y - b.y).abs())
}

pub fn is_large_enough(rect: Rect) -> bool {
    rect.width > MIN_SELECTION_SIZE && rect.height > MIN_SELECTION_SIZE
}

/// Обрезает прямоугольник по границам изображения cols x rows
pub fn clamp_to_image(rect: Rect, cols: i32, rows: i32) -> Option<Rect> {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + rect.width).min(cols);
    let y1 = (rect.y + rect.height).min(rows);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
}
