use anyhow::{anyhow, bail, Context, Result};
use query_tree::ast::{Group, GroupKind, Node, NodeId, Operator, Term};
use query_tree::config::BuilderConfig;
use query_tree::drag_drop::{DropIntent, DropOutcome};
use query_tree::fields::FieldCatalog;
use query_tree::session::BuilderSession;
use query_tree::storage::LocalStore;
use query_tree::validation::{validate_query_string, ValidationReport};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "query_tree.json";

const HELP: &str = "\
命令:
  add <parent> <op> [field|-] [value...]   添加条件, op: text exact contains starts-with ends-with exists not-exists range
  group <parent> [AND|OR]                  添加空组
  remove <id>                              删除节点
  move <id> <parent> <index>               移动节点
  combine <a> <b> [AND|OR]                 把两个节点合并为一个组
  kind <group> [AND|OR]                    设置组类型, 省略时切换
  drag <source> <before|after|into|combine> <target>
  parse <query>                            用查询字符串替换查询树
  validate <query>                         只检查查询字符串
  fields [field]                           列出字段或字段支持的搜索类型
  show                                     显示查询树
  query                                    生成查询字符串并发起搜索
  recent                                   最近的搜索
  reset                                    清空查询树
  help | quit";

enum Flow {
    Continue,
    Quit,
}

struct Shell {
    session: BuilderSession,
    catalog: FieldCatalog,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// 创建会话，配置加载失败时使用默认配置
fn create_shell() -> Shell {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = BuilderConfig::load_or_default(&config_path);

    let catalog = match &config.fields_path {
        Some(path) => FieldCatalog::from_json_file(path).unwrap_or_else(|e| {
            warn!(error = %e, "无法加载字段元数据");
            FieldCatalog::default()
        }),
        None => FieldCatalog::default(),
    };

    let storage = config.storage.clone();
    let mut session = BuilderSession::new(config);
    match LocalStore::open(&storage.path, storage.namespace, storage.version) {
        Ok(store) => session = session.with_store(store),
        Err(e) => warn!(error = %e, "本地存储不可用"),
    }
    info!(fields = catalog.len(), "shell ready");
    Shell { session, catalog }
}

fn history_path(shell: &Shell) -> PathBuf {
    shell
        .session
        .config()
        .storage
        .path
        .parent()
        .map(|dir| dir.join("history.txt"))
        .unwrap_or_else(|| PathBuf::from("history.txt"))
}

fn main() -> Result<()> {
    init_tracing();
    println!("--- Query Tree: 高级搜索查询构建器 ---");
    println!("输入 help 查看命令\n");

    let mut shell = create_shell();
    let history = history_path(&shell);
    let mut editor = DefaultEditor::new().context("无法初始化行编辑器")?;
    if editor.load_history(&history).is_err() {
        info!(path = %history.display(), "no history yet");
    }

    loop {
        match editor.readline("query> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                editor.add_history_entry(line)?;
                match shell.execute(line) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => println!("✗ {:#}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("读取输入失败"),
        }
    }

    if let Some(dir) = history.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).ok();
    }
    if let Err(e) = editor.save_history(&history) {
        warn!(error = %e, "无法保存命令历史");
    }
    Ok(())
}

impl Shell {
    fn execute(&mut self, line: &str) -> Result<Flow> {
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let args: Vec<&str> = rest.split_whitespace().collect();

        match command {
            "add" => {
                let (parent, term) = parse_add(&args)?;
                let id = self.session.add_term(&parent, term)?;
                println!("✓ 添加 {}", id);
            }
            "group" => {
                let parent = arg(&args, 0, "parent")?;
                let kind = optional_kind(&args, 1)?.unwrap_or(self.session.config().default_kind);
                let id = self.session.add_group(&parent, kind)?;
                println!("✓ 添加组 {}", id);
            }
            "remove" => {
                let id = arg(&args, 0, "id")?;
                let removed = self.session.remove(&id)?;
                println!("✓ 删除 {} 个节点", removed.size());
            }
            "move" => {
                let id = arg(&args, 0, "id")?;
                let parent = arg(&args, 1, "parent")?;
                let index: usize = args
                    .get(2)
                    .ok_or_else(|| anyhow!("缺少 index"))?
                    .parse()
                    .context("index 必须是非负整数")?;
                self.session.move_node(&id, &parent, index)?;
                println!("✓ 移动 {}", id);
            }
            "combine" => {
                let a = arg(&args, 0, "a")?;
                let b = arg(&args, 1, "b")?;
                let kind = optional_kind(&args, 2)?.unwrap_or(self.session.config().default_kind);
                let group = self.session.combine(&a, &b, kind)?;
                println!("✓ 合并到 {}", group);
            }
            "kind" => {
                let group = arg(&args, 0, "group")?;
                let kind = match optional_kind(&args, 1)? {
                    Some(kind) => {
                        self.session.set_group_kind(&group, kind)?;
                        kind
                    }
                    None => self.session.toggle_group_kind(&group)?,
                };
                println!("✓ {} 现在是 {}", group, kind);
            }
            "drag" => {
                let source = arg(&args, 0, "source")?;
                let intent = parse_intent(args.get(1).copied().unwrap_or_default())?;
                let target = arg(&args, 2, "target")?;
                match self.session.apply_drop(&source, &target, intent) {
                    DropOutcome::Moved { parent, index, .. } => {
                        println!("✓ 移动到 {} 的位置 {}", parent, index)
                    }
                    DropOutcome::Combined { group } => println!("✓ 合并到 {}", group),
                    DropOutcome::Rejected(reason) => println!("✗ 拒绝: {}", reason),
                }
            }
            "parse" => {
                let report = self.session.load_query_string(rest);
                print_report(&report);
                if report.is_valid() {
                    print_tree(self.session.tree().root());
                }
            }
            "validate" => print_report(&validate_query_string(rest)),
            "fields" => self.print_fields(args.first().copied()),
            "show" => print_tree(self.session.tree().root()),
            "query" => {
                let ticket = self.session.begin_search();
                println!("[{}] {}", ticket.seq, ticket.query);
            }
            "recent" => {
                for (i, query) in self.session.recent_queries().iter().enumerate() {
                    println!("{:>2}. {}", i + 1, query);
                }
            }
            "reset" => {
                self.session.reset();
                println!("✓ 已清空");
            }
            "help" => println!("{}", HELP),
            "quit" | "exit" => return Ok(Flow::Quit),
            other => bail!("未知命令: {} (输入 help 查看命令)", other),
        }
        Ok(Flow::Continue)
    }

    fn print_fields(&self, field: Option<&str>) {
        match field {
            None => {
                for info in self.catalog.fields() {
                    println!(
                        "  {:<32} {}",
                        info.property,
                        self.catalog.display_name(&info.property)
                    );
                }
            }
            Some(field) => {
                let field = (field != "-").then_some(field);
                for search_type in self.catalog.search_types_for(field) {
                    let mark = if search_type.disabled { " (disabled)" } else { "" };
                    println!("  {:<12} {}{}", search_type.operator.as_str(), search_type.label, mark);
                }
            }
        }
    }
}

fn arg(args: &[&str], index: usize, name: &str) -> Result<NodeId> {
    args.get(index)
        .map(|s| NodeId::from(*s))
        .ok_or_else(|| anyhow!("缺少 {}", name))
}

fn optional_kind(args: &[&str], index: usize) -> Result<Option<GroupKind>> {
    args.get(index)
        .map(|s| s.parse::<GroupKind>().map_err(anyhow::Error::from))
        .transpose()
}

fn parse_intent(s: &str) -> Result<DropIntent> {
    Ok(match s {
        "before" => DropIntent::ReorderBefore,
        "after" => DropIntent::ReorderAfter,
        "into" => DropIntent::NestInto,
        "combine" => DropIntent::CombineWith,
        other => bail!("未知的拖放方式 '{}', 应为 before/after/into/combine", other),
    })
}

/// add <parent> <op> [field|-] [value...]
fn parse_add(args: &[&str]) -> Result<(NodeId, Term)> {
    let parent = arg(args, 0, "parent")?;
    let op = args.get(1).ok_or_else(|| anyhow!("缺少 op"))?;
    let field = args.get(2).copied().filter(|f| *f != "-");
    let value = args.get(3..).map(|words| words.join(" ")).unwrap_or_default();

    if *op == "text" {
        let mut term = Term::text(value);
        term.field = field.map(str::to_string);
        return Ok((parent, term));
    }

    let operator: Operator = op.parse()?;
    let term = match operator {
        Operator::Exists | Operator::NotExists | Operator::Range if field.is_none() => {
            bail!("{} 需要字段", operator)
        }
        Operator::Exists => Term::exists(field.unwrap_or_default()),
        Operator::NotExists => Term::not_exists(field.unwrap_or_default()),
        Operator::Range => {
            let bound = |i: usize| args.get(i).copied().filter(|b| *b != "*");
            Term::range(field.unwrap_or_default(), bound(3), bound(4))
        }
        _ => {
            if value.is_empty() {
                bail!("缺少 value");
            }
            let mut term = Term::field("", operator, value);
            term.field = field.map(str::to_string);
            term
        }
    };
    Ok((parent, term))
}

fn print_report(report: &ValidationReport) {
    if report.is_valid() {
        println!("✓ {}", report.querystring);
        return;
    }
    for error in &report.errors {
        println!("✗ {}: {}", error.title, error.message);
    }
}

fn print_tree(root: &Group) {
    println!("{} [{}]", root.id, root.kind);
    print_children(root, 1);
}

fn print_children(group: &Group, depth: usize) {
    let indent = "  ".repeat(depth);
    for child in &group.children {
        match child {
            Node::Group(inner) => {
                println!("{}{} [{}]", indent, inner.id, inner.kind);
                print_children(inner, depth + 1);
            }
            Node::Leaf(leaf) => {
                let field = leaf.field.as_deref().unwrap_or("*");
                let op = leaf.operator.map(|o| o.as_str()).unwrap_or("text");
                println!("{}{} {} {} {}", indent, leaf.id, field, op, leaf.querystring);
            }
        }
    }
}
