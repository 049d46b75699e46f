//! Canned reply texts. Course and assignment listings are built from the
//! learner context the host sends with each message.

use super::{CourseInfo, LearnerContext};

pub const EMPTY_PROMPT: &str =
    "Need info on your courses, help with assignments, or tips for studying? Just ask! How can I support you today?";

pub const COURSE_PROMPT: &str =
    "Got it! Which course would you like to know more about? Just let me know the course name or number.";

const NO_COURSES: &str = "Looks like you're not enrolled in any courses at the moment. If that doesn't seem right, it's a good idea to check with your academic advisor or the registrar's office.";

const COURSES_FOLLOW_UP: &str = "Would you like information about:
• Upcoming assignments in these courses
• Course materials and resources
• Your progress in these courses

Let me know how I can help you with your studies!";

const NO_COURSES_FOR_ASSIGNMENTS: &str = "You don't appear to be enrolled in any courses, so I can't find assignment information. Please contact your academic advisor if you believe this is an error.";

const NO_ASSIGNMENTS: &str = "You don't have any upcoming assignments right now. Great chance to catch up on reading or review what you've learned so far!";

const ASSIGNMENT_TIPS: &str = "**Tips for assignment success:**

• Start early to avoid last-minute stress
• Break large assignments into smaller tasks
• Use the library and academic resources
• Don't hesitate to ask your instructor for clarification
• Consider forming a study group for complex projects

Would you like more specific advice on how to approach your assignments?";

pub const STUDY_TIPS: &str = "**Effective Study Strategies:**

1. **Active Recall**: Test yourself regularly instead of just re-reading notes
2. **Spaced Repetition**: Spread out your study sessions rather than cramming
3. **The Pomodoro Technique**: Study in 25-minute focused sessions with short breaks
4. **Create Mind Maps**: Visualize connections between concepts
5. **Teach Someone Else**: Explaining topics helps solidify your understanding
6. **Use Multiple Resources**: Textbooks, videos, practice problems, and discussions
7. **Take Effective Notes**: Use the Cornell method or other structured approaches
8. **Eliminate Distractions**: Create a dedicated study environment

Which of these would you like to learn more about?";

pub const EXAM_PREP: [&str; 2] = [
    "**Exam Preparation Guide:**

1. **Start Early**: Begin studying at least 1-2 weeks before the exam
2. **Create a Study Schedule**: Allocate time for each topic based on its difficulty
3. **Review Past Papers**: Practice with previous exams if available
4. **Form Study Groups**: Discuss difficult concepts with classmates
5. **Use Practice Tests**: Test yourself under timed conditions
6. **Take Care of Yourself**: Get enough sleep, eat well, and take breaks
7. **Know the Format**: Understand what types of questions will be asked
8. **Prepare Strategically**: Focus more on high-value topics

Would you like specific strategies for multiple-choice, essay, or problem-solving exams?",
    "**On Exam Day:**

• Arrive early to settle your nerves
• Read all instructions carefully before starting
• Budget your time based on question point values
• Answer easier questions first to build confidence
• Review your answers if time permits
• Stay calm and focused throughout the exam

Good luck with your preparation!",
];

pub const TIME_MANAGEMENT: [&str; 2] = [
    "**Effective Time Management for Students:**

1. **Use a Planner or Digital Calendar**: Record all deadlines, classes, and commitments
2. **Prioritize Tasks**: Use the Eisenhower Matrix (Urgent/Important grid)
3. **Break Down Large Projects**: Divide major assignments into smaller, manageable tasks
4. **Identify Your Peak Hours**: Schedule difficult tasks when you're most alert
5. **Set Specific Goals**: Define what you want to accomplish in each study session
6. **Eliminate Time Wasters**: Be mindful of social media and other distractions
7. **Learn to Say No**: Don't overcommit yourself
8. **Use 'Dead Time' Effectively**: Study flashcards while waiting for the bus

Would you like help creating a weekly study schedule?",
    "**Sample Weekly Schedule Template:**

• **Morning**: Review notes from the previous day (15-30 minutes)
• **Between Classes**: Quick review of upcoming class material
• **Afternoon**: Work on assignments and projects (2-3 hours)
• **Evening**: Prepare for the next day's classes (1-2 hours)
• **Weekend**: Catch up on readings and start on upcoming assignments

Remember to schedule breaks and leisure activities to avoid burnout!",
];

pub const LEARNING_RESOURCES: &str = "**Recommended Academic Resources:**

1. **Online Learning Platforms:**
   • Khan Academy - Free courses in math, science, and more
   • Coursera - University courses across various disciplines
   • edX - Courses from top institutions worldwide

2. **Research Tools:**
   • Google Scholar - Search academic papers
   • JSTOR - Digital library of academic journals
   • Library databases specific to your institution

3. **Study Aid Websites:**
   • Quizlet - Create and use flashcards
   • Grammarly - Writing assistance and grammar checker
   • Zotero - Reference management software

What subject are you looking for resources in specifically?";

const SUBJECT_PROMPT: &str = "Looking for help with a specific subject? Let me know what topic you're working on so I can find the best resources for you.";

pub const CAREER: [&str; 2] = [
    "**Career Planning and Development:**

1. **Explore Career Paths:**
   • Research job descriptions and requirements in your field
   • Speak with professionals through informational interviews
   • Attend career fairs and industry events

2. **Build Relevant Skills:**
   • Identify key skills needed in your desired field
   • Take relevant courses and seek certifications
   • Work on personal projects that demonstrate your abilities

3. **Gain Experience:**
   • Look for internships and volunteer opportunities
   • Participate in research projects with faculty
   • Join relevant student organizations and competitions

4. **Networking:**
   • Create a LinkedIn profile and connect with professionals
   • Attend industry meetups and conferences
   • Reach out to alumni from your institution

Would you like to discuss specific career paths related to your field of study?",
    "**Career Resources at Your Institution:**

• Visit your university's career services center
• Schedule an appointment with a career counselor
• Attend resume and interview workshops
• Check your institution's job board for opportunities

Remember that career planning is an ongoing process, and it's normal to explore different paths before finding the right fit!",
];

pub const WELLBEING: [&str; 2] = [
    "**Academic Wellbeing and Balance:**

1. **Managing Academic Stress:**
   • Break large tasks into smaller, manageable steps
   • Set realistic goals and celebrate small wins
   • Practice positive self-talk and avoid perfectionism
   • Use breathing exercises during stressful moments

2. **Maintaining Balance:**
   • Schedule regular breaks and leisure activities
   • Exercise regularly to clear your mind
   • Prioritize sleep and proper nutrition
   • Connect with friends and family for support

3. **When to Seek Help:**
   • If stress persists or interferes with daily functioning
   • When feeling overwhelmed or unable to cope
   • If experiencing persistent negative thoughts

Remember that seeking help is a sign of strength, not weakness. Your institution likely has counseling services available to students.",
    "**Motivation Strategies:**

• Set meaningful, specific goals for your studies
• Find your 'why' - connect your studies to your larger purpose
• Create a reward system for completing tasks
• Visualize your success and the benefits of your education
• Find an accountability partner or study group

Would you like more specific strategies for academic motivation or stress management?",
];

pub const TECHNOLOGY: &str = "**Helpful Academic Tools and Technologies:**

1. **Note-Taking and Organization:**
   • Notion - All-in-one workspace for notes, tasks, and projects
   • OneNote/Evernote - Digital notebooks with organization features
   • Obsidian - Knowledge management with linked notes

2. **Productivity:**
   • Forest - Stay focused and avoid phone distractions
   • Todoist - Task management and to-do lists
   • Focus@Will - Music designed to improve concentration

3. **Research and Writing:**
   • Zotero - Reference management
   • Grammarly - Writing assistance and proofreading
   • Google Scholar - Academic paper search

4. **Study Aids:**
   • Anki - Spaced repetition flashcards
   • Quizlet - Study sets and practice tests
   • Pomodoro Timer apps - Structured study sessions

Which category of tools are you most interested in learning more about?";

pub const GRATITUDE: &str =
    "You're very welcome! Let me know if there's anything else I can help you with.";

pub const NOT_UNDERSTOOD: [&str; 2] = [
    "I'm not quite sure I understand your question. Here are some topics I can help you with:",
    "• Information about your courses and assignments
• Study tips and exam preparation
• Time management and scheduling
• Subject-specific help and resources
• Academic planning and career guidance

Could you please rephrase your question or select one of these topics?",
];

const GENERAL_ASSIGNMENT_HELP: &str = "**General Assignment Tips:**\n\n1. **Understand the Requirements**: Carefully read all instructions\n2. **Create a Plan**: Break the assignment into manageable parts\n3. **Research Thoroughly**: Gather relevant information and sources\n4. **Start Early**: Allow time for revisions and unexpected challenges\n5. **Seek Feedback**: Have someone review your work before submission\n\nCould you tell me what type of assignment you need help with? (Essay, presentation, group project, research, programming, etc.)";

/// Assignment kinds in match order, with their trigger words.
const ASSIGNMENT_HELP: &[(&[&str], &str)] = &[
    (
        &["essay", "writing", "paper", "report"],
        "**Essay Writing Tips:**\n\n1. **Start with a Clear Thesis**: Your thesis statement should concisely state your main argument\n2. **Create an Outline**: Plan your essay structure before writing\n3. **Use Evidence**: Support claims with research and citations\n4. **Draft, Revise, Edit**: Never submit your first draft\n5. **Follow Citation Guidelines**: Use the required format (APA, MLA, etc.)\n\nWould you like specific help with thesis development, research methods, or citation?",
    ),
    (
        &["presentation", "slides", "powerpoint", "speaking", "talk"],
        "**Presentation Tips:**\n\n1. **Start with a Hook**: Capture attention in the first 30 seconds\n2. **Follow the 6x6 Rule**: No more than 6 points per slide, 6 words per point\n3. **Use Visual Aids**: Include relevant images, charts, and minimal text\n4. **Practice Delivery**: Rehearse timing, tone, and pacing\n5. **Prepare for Questions**: Anticipate and research potential questions\n\nWould you like specific help with slide design, delivery techniques, or managing presentation anxiety?",
    ),
    (
        &["group", "team", "project", "collaboration", "partner"],
        "**Group Project Strategies:**\n\n1. **Define Clear Roles**: Assign specific responsibilities to each member\n2. **Set Deadlines**: Create a timeline with milestones before the final due date\n3. **Maintain Communication**: Regular check-ins keep everyone accountable\n4. **Use Collaborative Tools**: Consider Google Docs, Trello, or Microsoft Teams\n5. **Have a Backup Plan**: Prepare for potential member absence or contribution issues\n\nWould you like advice on handling group conflicts, coordinating schedules, or project management tools?",
    ),
    (
        &["research", "data", "analysis", "study", "experiment", "survey"],
        "**Research Project Advice:**\n\n1. **Narrow Your Focus**: Choose a specific research question\n2. **Literature Review**: Examine existing research before starting\n3. **Methodology Matters**: Select appropriate methods for your question\n4. **Data Management**: Plan how you'll collect and analyze data\n5. **Ethics Consideration**: Ensure your research follows ethical guidelines\n\nWould you like help with research questions, data analysis methods, or finding scholarly sources?",
    ),
    (
        &["programming", "coding", "software", "development", "code"],
        "**Programming Assignment Tips:**\n\n1. **Understand Requirements**: Clarify all requirements before coding\n2. **Plan Before Coding**: Create pseudocode or flowcharts\n3. **Incremental Development**: Build and test in small sections\n4. **Comment Your Code**: Document your logic for yourself and others\n5. **Start Early**: Programming always takes longer than expected\n\nWould you like advice on debugging techniques, code organization, or specific programming languages?",
    ),
];

const COMPREHENSIVE_STUDY_HELP: &str = "**Comprehensive Study Strategies:**\n\n1. **Understand Your Learning Style**:\n   • Visual learners benefit from diagrams and videos\n   • Auditory learners should record and listen to lectures\n   • Kinesthetic learners should incorporate movement and hands-on activities\n\n2. **Strategic Time Management**:\n   • Study difficult subjects when you're most alert\n   • Break study sessions into 45-50 minute blocks\n   • Include short breaks to prevent mental fatigue\n\n3. **Active Learning Techniques**:\n   • Summarize information in your own words\n   • Create practice tests for yourself\n   • Apply concepts to real-world examples\n   • Use flashcards for key terms and concepts\n\n4. **Environment Optimization**:\n   • Find a consistent study location with minimal distractions\n   • Ensure proper lighting and comfortable seating\n   • Keep all necessary materials within reach\n\nWhat specific aspect of studying would you like more detailed advice on?";

const STUDY_TECHNIQUES: &[(&[&str], &str)] = &[
    (
        &["memory", "remember", "memorize", "forget", "recall"],
        "**Memory Enhancement Techniques:**\n\n1. **Spaced Repetition**: Review material at increasing intervals (1 day, 3 days, 1 week)\n2. **Mnemonics**: Create acronyms, rhymes, or visual associations\n3. **Mind Palace**: Associate information with specific locations\n4. **Chunking**: Group information into manageable units\n5. **Active Recall**: Test yourself instead of just reviewing\n6. **Teach Others**: Explaining concepts reinforces memory\n\nThese techniques work by forming stronger neural connections and utilizing multiple memory pathways in your brain.",
    ),
    (
        &["focus", "concentrate", "distraction", "attention", "procrastination"],
        "**Improving Focus and Concentration:**\n\n1. **Pomodoro Technique**: Work for 25 minutes, then take a 5-minute break\n2. **Environment Optimization**: Create a dedicated, distraction-free study space\n3. **Digital Detox**: Use website blockers and put your phone on Do Not Disturb\n4. **Brain Training**: Gradually increase focus duration over time\n5. **Physical Exercise**: Regular exercise improves cognitive function\n6. **Mindfulness Practice**: Brief meditation before studying sharpens attention\n\nRemember that focus is like a muscle - it gets stronger with consistent practice.",
    ),
    (
        &["notes", "taking notes", "notetak", "writing down", "summarize"],
        "**Effective Note-Taking Methods:**\n\n1. **Cornell Method**: Divide page into cues, notes, and summary sections\n2. **Mind Mapping**: Create visual connections between related concepts\n3. **Outline Method**: Organize information hierarchically with headings and subpoints\n4. **Charting Method**: Create tables for comparing and contrasting topics\n5. **Sentence Method**: Write complete, concise sentences for each main point\n6. **Digital Tools**: Consider apps like Notion, OneNote, or Evernote for organization\n\nThe best method varies by subject and your learning style - experiment to find what works for you.",
    ),
    (
        &["exam", "test", "quiz", "final", "midterm"],
        "**Exam Preparation Strategies:**\n\n1. **Create a Study Schedule**: Allocate time for each topic based on importance/difficulty\n2. **Practice Past Exams**: Familiarize yourself with format and common question types\n3. **Group Study Sessions**: Explain concepts to peers and learn from their perspectives\n4. **Cumulative Review**: Regularly revisit previously studied material\n5. **Simulate Exam Conditions**: Practice under timed, distraction-free conditions\n6. **Healthy Routine**: Maintain proper sleep, nutrition, and exercise\n\nPrepare mentally by visualizing success and planning stress-management techniques for exam day.",
    ),
];

const SUBJECT_NAMES: &[(&str, &str)] = &[
    ("math", "mathematics"),
    ("science", "science"),
    ("physics", "physics"),
    ("chemistry", "chemistry"),
    ("biology", "biology"),
    ("history", "history"),
    ("english", "English"),
    ("language", "languages"),
    ("programming", "programming"),
    ("economics", "economics"),
];

fn first_match(lower: &str, table: &[(&[&str], &'static str)]) -> Option<&'static str> {
    table
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, text)| *text)
}

pub fn assignment_help(lower: &str) -> &'static str {
    first_match(lower, ASSIGNMENT_HELP).unwrap_or(GENERAL_ASSIGNMENT_HELP)
}

pub fn detailed_study_tips(lower: &str) -> &'static str {
    first_match(lower, STUDY_TECHNIQUES).unwrap_or(COMPREHENSIVE_STUDY_HELP)
}

pub fn subject_help(lower: &str) -> String {
    let Some((_, subject)) = SUBJECT_NAMES.iter().find(|(k, _)| lower.contains(k)) else {
        return SUBJECT_PROMPT.to_string();
    };
    format!(
        "**Resources for {s} students:**

1. **Online Learning:**
   • Khan Academy has excellent {s} tutorials
   • YouTube channels like Crash Course {s}
   • MIT OpenCourseWare offers free {s} lectures

2. **Helpful Websites:**
   • Subject-specific forums where you can ask questions
   • Interactive practice problem sites
   • Visual learning tools and simulations

3. **Study Strategies for {s}:**
   • Practice regularly with varied problem sets
   • Join study groups with classmates
   • Create concept maps to connect ideas
   • Teach concepts to others to reinforce understanding

Would you like more specific resources for particular topics in {s}?",
        s = subject
    )
}

pub fn greeting(first_name: &str) -> String {
    let name = if first_name.trim().is_empty() {
        "there"
    } else {
        first_name.trim()
    };
    format!(
        "Hey {}, great to see you! Need help with an assignment, study tips, or anything else for class?",
        name
    )
}

pub fn identity(bot_name: &str) -> String {
    format!(
        "I'm {}, your AI study buddy. I can help you with your courses, share study tips, suggest resources, and answer academic questions. Just think of me as your go-to helper for school stuff!",
        bot_name
    )
}

pub fn welcome(first_name: &str, bot_name: &str) -> Vec<String> {
    vec![
        format!(
            "Hi, {}! I'm {}, your academic assistant. I'm here to help you with anything related to your studies.",
            first_name.trim(),
            bot_name
        ),
        "I can assist you with:
• Course information and materials
• Assignment help and study tips
• Academic planning and schedules
• Learning strategies and resources

How can I support your academic journey today?"
            .to_string(),
    ]
}

pub fn course_list(learner: &LearnerContext) -> Vec<String> {
    if learner.courses.is_empty() {
        return vec![NO_COURSES.to_string()];
    }
    let mut text = String::from("Here are the courses you're currently enrolled in:\n\n");
    for course in &learner.courses {
        text.push_str(&format!("• **{}**\n", course.full_name));
        if let Some(url) = course.url.as_deref() {
            text.push_str(&format!("  Access: [Click here to view course]({})\n", url));
        }
        text.push('\n');
    }
    vec![text, COURSES_FOLLOW_UP.to_string()]
}

pub fn assignment_list(learner: &LearnerContext) -> Vec<String> {
    if learner.courses.is_empty() {
        return vec![NO_COURSES_FOR_ASSIGNMENTS.to_string()];
    }
    let mut text = String::from("Here are your upcoming assignments:\n\n");
    let mut any = false;
    for course in &learner.courses {
        for a in &course.assignments {
            any = true;
            text.push_str(&format!("• **{}** - {}\n", a.name, course.short_name));
            text.push_str(&format!("  Due: {}\n", a.due_label()));
            if let Some(url) = a.url.as_deref() {
                text.push_str(&format!("  [View assignment details]({})\n", url));
            }
            text.push('\n');
        }
    }
    if !any {
        text = NO_ASSIGNMENTS.to_string();
    }
    vec![text, ASSIGNMENT_TIPS.to_string()]
}

pub fn course_details(course: &CourseInfo) -> String {
    let mut text = format!("**{}**\n\n", course.full_name);
    if let Some(summary) = course.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        text.push_str(&format!("**Description**: {}\n\n", summary));
    }
    if let Some(url) = course.url.as_deref() {
        text.push_str(&format!("**Course Link**: [Access course materials]({})\n\n", url));
    }
    if course.assignments.is_empty() {
        text.push_str("There are no upcoming assignments in this course at the moment.\n");
    } else {
        text.push_str("**Upcoming Assignments**:\n");
        for a in &course.assignments {
            text.push_str(&format!("• {} - Due: {}\n", a.name, a.due_label()));
        }
        text.push('\n');
    }
    text.push_str("\nWould you like information about another course, or help with anything else?");
    text
}
