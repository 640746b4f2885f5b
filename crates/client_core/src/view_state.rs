//! Mutually exclusive UI modes of the course editor, kept as explicit enums.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Viewing,
    Editing,
}

impl EditMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Viewing => Self::Editing,
            Self::Editing => Self::Viewing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChapterPanelMode {
    #[default]
    Listing,
    Creating,
}

impl ChapterPanelMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Listing => Self::Creating,
            Self::Creating => Self::Listing,
        }
    }
}

/// Whether a chapter reorder request is in flight. While `Updating`, the list
/// is drawn disabled and further drags are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReorderState {
    #[default]
    Idle,
    Updating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoursePanel {
    Title,
    Description,
    Image,
    Price,
    Attachments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CourseEditorView {
    title: EditMode,
    description: EditMode,
    image: EditMode,
    price: EditMode,
    attachments: EditMode,
    chapters: ChapterPanelMode,
}

impl CourseEditorView {
    pub fn mode(&self, panel: CoursePanel) -> EditMode {
        *self.slot(panel)
    }

    pub fn toggle(&mut self, panel: CoursePanel) -> EditMode {
        let slot = self.slot_mut(panel);
        *slot = slot.toggled();
        *slot
    }

    pub fn close(&mut self, panel: CoursePanel) {
        *self.slot_mut(panel) = EditMode::Viewing;
    }

    pub fn chapters(&self) -> ChapterPanelMode {
        self.chapters
    }

    pub fn toggle_chapters(&mut self) -> ChapterPanelMode {
        self.chapters = self.chapters.toggled();
        self.chapters
    }

    pub fn finish_chapter_creation(&mut self) {
        self.chapters = ChapterPanelMode::Listing;
    }

    fn slot(&self, panel: CoursePanel) -> &EditMode {
        match panel {
            CoursePanel::Title => &self.title,
            CoursePanel::Description => &self.description,
            CoursePanel::Image => &self.image,
            CoursePanel::Price => &self.price,
            CoursePanel::Attachments => &self.attachments,
        }
    }

    fn slot_mut(&mut self, panel: CoursePanel) -> &mut EditMode {
        match panel {
            CoursePanel::Title => &mut self.title,
            CoursePanel::Description => &mut self.description,
            CoursePanel::Image => &mut self.image,
            CoursePanel::Price => &mut self.price,
            CoursePanel::Attachments => &mut self.attachments,
        }
    }
}
